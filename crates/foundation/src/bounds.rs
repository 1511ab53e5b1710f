use crate::math::LngLat;

/// Axis-aligned lng/lat bounding box (degrees).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LngLatBounds {
    pub min: LngLat,
    pub max: LngLat,
}

impl LngLatBounds {
    pub fn new(min: LngLat, max: LngLat) -> Self {
        LngLatBounds { min, max }
    }

    pub fn from_point(p: LngLat) -> Self {
        Self { min: p, max: p }
    }

    /// Smallest box containing every point, `None` for an empty input.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a LngLat>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut out = Self::from_point(*first);
        for p in iter {
            out.extend(*p);
        }
        Some(out)
    }

    pub fn extend(&mut self, p: LngLat) {
        self.min.lng = self.min.lng.min(p.lng);
        self.min.lat = self.min.lat.min(p.lat);
        self.max.lng = self.max.lng.max(p.lng);
        self.max.lat = self.max.lat.max(p.lat);
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut out = *self;
        out.extend(other.min);
        out.extend(other.max);
        out
    }

    pub fn center(&self) -> LngLat {
        LngLat::new(
            (self.min.lng + self.max.lng) * 0.5,
            (self.min.lat + self.max.lat) * 0.5,
        )
    }
}
