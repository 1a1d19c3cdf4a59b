use crate::enums::SlabMode;

/// Reduces the samples of a thick slab into one value per component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Compositor {
    mode: SlabMode,
    trapezoid: bool,
}

impl Compositor {
    /// `trapezoid` halves the weight of the first and last sample in SUM and
    /// MEAN modes; MIN and MAX ignore it.
    pub fn new(mode: SlabMode, trapezoid: bool) -> Self {
        Self { mode, trapezoid }
    }

    pub fn mode(&self) -> SlabMode {
        self.mode
    }

    /// `samples` holds `count` pixels of `components` values each, one pixel
    /// after the other. The reduced pixel is written to `out`.
    pub fn composite(&self, samples: &[f64], components: usize, count: usize, out: &mut [f64]) {
        let out = &mut out[..components];
        if count == 0 {
            out.fill(0.0);
            return;
        }
        let pixel = |n: usize| &samples[n * components..(n + 1) * components];
        out.copy_from_slice(pixel(0));
        if count == 1 {
            return;
        }

        match self.mode {
            SlabMode::Min => {
                for n in 1..count {
                    for (acc, &v) in out.iter_mut().zip(pixel(n)) {
                        *acc = acc.min(v);
                    }
                }
            }
            SlabMode::Max => {
                for n in 1..count {
                    for (acc, &v) in out.iter_mut().zip(pixel(n)) {
                        *acc = acc.max(v);
                    }
                }
            }
            SlabMode::Sum | SlabMode::Mean => {
                let trapezoid = self.trapezoid;
                if trapezoid {
                    out.iter_mut().for_each(|acc| *acc *= 0.5);
                }
                for n in 1..count {
                    let weight = if trapezoid && n == count - 1 { 0.5 } else { 1.0 };
                    for (acc, &v) in out.iter_mut().zip(pixel(n)) {
                        *acc = v.mul_add(weight, *acc);
                    }
                }
                if self.mode == SlabMode::Mean {
                    let divisor = (if trapezoid { count - 1 } else { count }) as f64;
                    out.iter_mut().for_each(|acc| *acc /= divisor);
                }
            }
        }
    }
}
