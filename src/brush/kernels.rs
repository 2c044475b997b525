//! Phase-indexed antialias kernels
//!
//! Each kernel is a 3x3 integer matrix summing to exactly [`KERNEL_SUM`]. It
//! is the outer product of two 1D weight triples, each obtained by
//! integrating a unit tent filter centered at the phase's subpixel shift
//! over the three destination cells around it.

use std::sync::OnceLock;

/// Subpixel phases per axis, minus one
pub const KERNEL_SUBSAMPLE: usize = 4;
pub const KERNEL_WIDTH: usize = 3;
pub const KERNEL_HEIGHT: usize = 3;
/// Normalization factor every kernel sums to
pub const KERNEL_SUM: u32 = 256;

pub type Kernel = [[u32; KERNEL_WIDTH]; KERNEL_HEIGHT];

const PHASES: usize = KERNEL_SUBSAMPLE + 1;

static KERNELS: OnceLock<[[Kernel; PHASES]; PHASES]> = OnceLock::new();

/// Kernel for phase pair (`index_y`, `index_x`), both in `0..=KERNEL_SUBSAMPLE`
pub fn kernel(index_y: usize, index_x: usize) -> &'static Kernel {
    let table = KERNELS.get_or_init(build_table);
    &table[index_y.min(KERNEL_SUBSAMPLE)][index_x.min(KERNEL_SUBSAMPLE)]
}

/// Subpixel shift represented by phase `index`, in pixels
pub fn phase_shift(index: usize) -> f64 {
    (index as f64 + 0.5) / PHASES as f64 - 0.5
}

/// Integral of a unit tent from -inf to `u`
fn tent_cdf(u: f64) -> f64 {
    if u <= -1.0 {
        0.0
    } else if u < 0.0 {
        (1.0 + u) * (1.0 + u) / 2.0
    } else if u < 1.0 {
        1.0 - (1.0 - u) * (1.0 - u) / 2.0
    } else {
        1.0
    }
}

fn weights(shift: f64) -> [f64; 3] {
    let mut w = [0.0; 3];
    for (i, slot) in w.iter_mut().enumerate() {
        let cell = i as f64 - 1.0;
        *slot = tent_cdf(cell + 0.5 - shift) - tent_cdf(cell - 0.5 - shift);
    }
    w
}

fn build_kernel(index_y: usize, index_x: usize) -> Kernel {
    let wy = weights(phase_shift(index_y));
    let wx = weights(phase_shift(index_x));

    let mut k = [[0u32; KERNEL_WIDTH]; KERNEL_HEIGHT];
    let mut total = 0i64;
    let mut largest = (1, 1);
    for r in 0..KERNEL_HEIGHT {
        for s in 0..KERNEL_WIDTH {
            k[r][s] = (wy[r] * wx[s] * KERNEL_SUM as f64).round() as u32;
            total += k[r][s] as i64;
            if k[r][s] > k[largest.0][largest.1] {
                largest = (r, s);
            }
        }
    }

    // rounding residue goes to the heaviest tap
    let fixed = k[largest.0][largest.1] as i64 + KERNEL_SUM as i64 - total;
    k[largest.0][largest.1] = fixed.max(0) as u32;
    k
}

fn build_table() -> [[Kernel; PHASES]; PHASES] {
    let mut table = [[[[0; KERNEL_WIDTH]; KERNEL_HEIGHT]; PHASES]; PHASES];
    for (iy, row) in table.iter_mut().enumerate() {
        for (ix, slot) in row.iter_mut().enumerate() {
            *slot = build_kernel(iy, ix);
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kernel_sums_to_normalization() {
        for iy in 0..=KERNEL_SUBSAMPLE {
            for ix in 0..=KERNEL_SUBSAMPLE {
                let sum: u32 = kernel(iy, ix).iter().flatten().sum();
                assert_eq!(sum, KERNEL_SUM, "phase ({}, {})", iy, ix);
            }
        }
    }

    #[test]
    fn test_center_phase_is_symmetric() {
        let mid = KERNEL_SUBSAMPLE / 2;
        let k = kernel(mid, mid);
        assert_eq!(k[0][0], k[2][2]);
        assert_eq!(k[0][1], k[2][1]);
        assert_eq!(k[1][0], k[1][2]);
        assert!(k[1][1] > k[0][1]);
    }

    #[test]
    fn test_phase_shifts_move_weight() {
        let first = kernel(KERNEL_SUBSAMPLE / 2, 0);
        let last = kernel(KERNEL_SUBSAMPLE / 2, KERNEL_SUBSAMPLE);
        assert!(first[1][0] > first[1][2]);
        assert!(last[1][2] > last[1][0]);
    }
}
