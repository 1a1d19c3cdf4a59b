//! Per-row masks restricting which output voxels are computed.

/// A run of consecutive x indices in one row with the same stencil status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StencilSpan {
    pub start: i32,
    pub end: i32,
    pub inside: bool,
}

impl StencilSpan {
    pub fn len(&self) -> usize {
        (self.end - self.start + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// Sorted, non-overlapping `[x0, x1]` extents for every `(y, z)` row of an
/// index extent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageStencil {
    extent: [i32; 6],
    rows: Vec<Vec<(i32, i32)>>,
}

impl ImageStencil {
    /// An empty stencil: nothing is inside.
    pub fn new(extent: [i32; 6]) -> Self {
        let rows = Self::row_count(&extent);
        Self {
            extent,
            rows: vec![Vec::new(); rows],
        }
    }

    /// A stencil whose rows cover the whole extent.
    pub fn full(extent: [i32; 6]) -> Self {
        let mut stencil = Self::new(extent);
        for row in &mut stencil.rows {
            row.push((extent[0], extent[1]));
        }
        stencil
    }

    fn row_count(extent: &[i32; 6]) -> usize {
        let ny = (i64::from(extent[3]) - i64::from(extent[2]) + 1).max(0) as usize;
        let nz = (i64::from(extent[5]) - i64::from(extent[4]) + 1).max(0) as usize;
        ny * nz
    }

    fn row_index(&self, y: i32, z: i32) -> Option<usize> {
        let e = &self.extent;
        if y < e[2] || y > e[3] || z < e[4] || z > e[5] {
            return None;
        }
        let ny = (e[3] - e[2] + 1) as usize;
        Some((z - e[4]) as usize * ny + (y - e[2]) as usize)
    }

    pub fn extent(&self) -> [i32; 6] {
        self.extent
    }

    /// Add `[x0, x1]` to row `(y, z)`, merging with touching extents.
    /// Rows outside the stencil extent are ignored.
    pub fn insert_next_extent(&mut self, x0: i32, x1: i32, y: i32, z: i32) {
        if x1 < x0 {
            return;
        }
        let Some(index) = self.row_index(y, z) else {
            return;
        };
        let row = &mut self.rows[index];
        row.push((x0, x1));
        row.sort_unstable();
        let mut merged: Vec<(i32, i32)> = Vec::with_capacity(row.len());
        for &(start, end) in row.iter() {
            match merged.last_mut() {
                Some(last) if start <= last.1 + 1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }
        *row = merged;
    }

    pub fn row_extents(&self, y: i32, z: i32) -> &[(i32, i32)] {
        self.row_index(y, z)
            .map(|index| self.rows[index].as_slice())
            .unwrap_or(&[])
    }

    pub fn is_inside(&self, x: i32, y: i32, z: i32) -> bool {
        self.row_extents(y, z)
            .iter()
            .any(|&(start, end)| start <= x && x <= end)
    }

    /// True when every row of `extent` is entirely inside the stencil.
    pub fn covers(&self, extent: &[i32; 6]) -> bool {
        (extent[4]..=extent[5]).all(|z| {
            (extent[2]..=extent[3]).all(|y| {
                self.row_extents(y, z)
                    .iter()
                    .any(|&(start, end)| start <= extent[0] && extent[1] <= end)
            })
        })
    }

    /// Partition `[x0, x1]` of row `(y, z)` into alternating inside/outside spans.
    pub fn spans(&self, x0: i32, x1: i32, y: i32, z: i32) -> Vec<StencilSpan> {
        let mut spans = Vec::new();
        let mut cursor = x0;
        for &(start, end) in self.row_extents(y, z) {
            let start = start.max(x0);
            let end = end.min(x1);
            if end < start {
                continue;
            }
            if start > cursor {
                spans.push(StencilSpan {
                    start: cursor,
                    end: start - 1,
                    inside: false,
                });
            }
            spans.push(StencilSpan {
                start,
                end,
                inside: true,
            });
            cursor = end + 1;
        }
        if cursor <= x1 {
            spans.push(StencilSpan {
                start: cursor,
                end: x1,
                inside: false,
            });
        }
        spans
    }
}
