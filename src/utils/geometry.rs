use std::ops::{Add, AddAssign, Sub, SubAssign};

/// A point in window-local coordinate space
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point<N> {
    /// horizontal coordinate
    pub x: N,
    /// vertical coordinate
    pub y: N,
}

impl<N> Point<N> {
    /// Create a point from its coordinates
    pub fn new(x: N, y: N) -> Point<N> {
        Point { x, y }
    }
}

impl Point<f64> {
    /// Round the coordinates down to integer pixels
    pub fn to_i32_floor(self) -> Point<i32> {
        Point::new(self.x.floor() as i32, self.y.floor() as i32)
    }
}

impl<N: Add<Output = N>> Add for Point<N> {
    type Output = Point<N>;
    fn add(self, other: Point<N>) -> Point<N> {
        Point::new(self.x + other.x, self.y + other.y)
    }
}

impl<N: AddAssign> AddAssign for Point<N> {
    fn add_assign(&mut self, other: Point<N>) {
        self.x += other.x;
        self.y += other.y;
    }
}

impl<N: Sub<Output = N>> Sub for Point<N> {
    type Output = Point<N>;
    fn sub(self, other: Point<N>) -> Point<N> {
        Point::new(self.x - other.x, self.y - other.y)
    }
}

impl<N: SubAssign> SubAssign for Point<N> {
    fn sub_assign(&mut self, other: Point<N>) {
        self.x -= other.x;
        self.y -= other.y;
    }
}

impl<N> From<(N, N)> for Point<N> {
    fn from((x, y): (N, N)) -> Point<N> {
        Point { x, y }
    }
}

/// A two-dimensional extent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size<N> {
    /// horizontal extent
    pub w: N,
    /// vertical extent
    pub h: N,
}

impl<N> Size<N> {
    /// Create a size from its extents
    pub fn new(w: N, h: N) -> Size<N> {
        Size { w, h }
    }
}

impl Size<i32> {
    /// Whether both extents are strictly positive
    pub fn is_positive(&self) -> bool {
        self.w > 0 && self.h > 0
    }

    /// Whether either extent is zero, the protocol encoding of "you choose"
    pub fn is_unspecified(&self) -> bool {
        self.w == 0 || self.h == 0
    }
}

impl<N> From<(N, N)> for Size<N> {
    fn from((w, h): (N, N)) -> Size<N> {
        Size { w, h }
    }
}

/// An axis-aligned rectangle, used for damage regions and window geometry
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rectangle<N> {
    /// position of the top-left corner
    pub loc: Point<N>,
    /// extent of the rectangle
    pub size: Size<N>,
}

impl<N: Copy> Rectangle<N> {
    /// Create a rectangle from location and size
    pub fn new(loc: Point<N>, size: Size<N>) -> Rectangle<N> {
        Rectangle { loc, size }
    }

    /// Create a rectangle from raw coordinates
    pub fn from_coords(x: N, y: N, w: N, h: N) -> Rectangle<N> {
        Rectangle {
            loc: Point::new(x, y),
            size: Size::new(w, h),
        }
    }
}

impl Rectangle<i32> {
    /// Create a rectangle covering a whole size, located at the origin
    pub fn from_size(size: Size<i32>) -> Rectangle<i32> {
        Rectangle {
            loc: Point::new(0, 0),
            size,
        }
    }

    /// Whether this rectangle contains the given point
    pub fn contains<P: Into<Point<i32>>>(&self, point: P) -> bool {
        let p = point.into();
        p.x >= self.loc.x
            && p.y >= self.loc.y
            && p.x < self.loc.x + self.size.w
            && p.y < self.loc.y + self.size.h
    }

    /// Whether this rectangle overlaps the other one
    pub fn overlaps(&self, other: &Rectangle<i32>) -> bool {
        self.loc.x < other.loc.x + other.size.w
            && other.loc.x < self.loc.x + self.size.w
            && self.loc.y < other.loc.y + other.size.h
            && other.loc.y < self.loc.y + self.size.h
    }

    /// Compute the intersection of two rectangles, if any
    pub fn intersection(&self, other: &Rectangle<i32>) -> Option<Rectangle<i32>> {
        if !self.overlaps(other) {
            return None;
        }
        let x = self.loc.x.max(other.loc.x);
        let y = self.loc.y.max(other.loc.y);
        let r = (self.loc.x + self.size.w).min(other.loc.x + other.size.w);
        let b = (self.loc.y + self.size.h).min(other.loc.y + other.size.h);
        Some(Rectangle::from_coords(x, y, r - x, b - y))
    }

    /// Grow the rectangle to also cover `other`
    pub fn merge(self, other: Rectangle<i32>) -> Rectangle<i32> {
        let x = self.loc.x.min(other.loc.x);
        let y = self.loc.y.min(other.loc.y);
        let r = (self.loc.x + self.size.w).max(other.loc.x + other.size.w);
        let b = (self.loc.y + self.size.h).max(other.loc.y + other.size.h);
        Rectangle::from_coords(x, y, r - x, b - y)
    }

    /// Translate the rectangle by the given offset
    pub fn translated(self, offset: Point<i32>) -> Rectangle<i32> {
        Rectangle {
            loc: self.loc + offset,
            size: self.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangle_contains_point_inside() {
        let rect = Rectangle::from_coords(10, 10, 20, 20);
        assert!(rect.contains((10, 10)));
        assert!(rect.contains((29, 29)));
        assert!(!rect.contains((30, 30)));
        assert!(!rect.contains((9, 15)));
    }

    #[test]
    fn rectangle_intersection() {
        let a = Rectangle::from_coords(0, 0, 10, 10);
        let b = Rectangle::from_coords(5, 5, 10, 10);
        assert_eq!(a.intersection(&b), Some(Rectangle::from_coords(5, 5, 5, 5)));

        let c = Rectangle::from_coords(20, 20, 5, 5);
        assert_eq!(a.intersection(&c), None);
    }

    #[test]
    fn rectangle_merge_covers_both() {
        let a = Rectangle::from_coords(0, 0, 10, 10);
        let b = Rectangle::from_coords(15, 5, 10, 10);
        let merged = a.merge(b);
        assert_eq!(merged, Rectangle::from_coords(0, 0, 25, 15));
    }

    #[test]
    fn size_unspecified() {
        assert!(Size::new(0, 600).is_unspecified());
        assert!(Size::new(800, 0).is_unspecified());
        assert!(!Size::new(800, 600).is_unspecified());
    }
}
