#[derive(Clone, Copy, Debug)]
pub(crate) struct Fnv1a64(u64);

impl Fnv1a64 {
    pub(crate) const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01B3;

    pub(crate) fn new_default() -> Self {
        Self(Self::OFFSET_BASIS)
    }

    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) {
        let mut h = self.0;
        for &b in bytes {
            h ^= u64::from(b);
            h = h.wrapping_mul(Self::PRIME);
        }
        self.0 = h;
    }

    pub(crate) fn finish(self) -> u64 {
        self.0
    }
}

/// Convert HSV in `[0, 1]` to 8-bit RGB, truncating each channel.
pub(crate) fn hsv_to_rgb(h: f64, s: f64, v: f64) -> [u8; 3] {
    let h = h.rem_euclid(1.0);
    let (r, g, b) = if s == 0.0 {
        (v, v, v)
    } else {
        let i = (h * 6.0).floor();
        let f = h * 6.0 - i;
        let p = v * (1.0 - s);
        let q = v * (1.0 - s * f);
        let t = v * (1.0 - s * (1.0 - f));
        match (i as i64).rem_euclid(6) {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        }
    };
    let to_u8 = |c: f64| (c * 255.0).clamp(0.0, 255.0) as u8;
    [to_u8(r), to_u8(g), to_u8(b)]
}

/// Gaussian kernel density estimate of `samples` evaluated at `at` (Scott's bandwidth).
pub(crate) fn gaussian_kde(samples: &[f64], at: &[f64]) -> Vec<f64> {
    let n = samples.len();
    if n == 0 {
        return vec![0.0; at.len()];
    }
    let nf = n as f64;
    let mean = samples.iter().sum::<f64>() / nf;
    let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (nf - 1.0).max(1.0);
    let bw = (var.sqrt() * nf.powf(-0.2)).max(1e-9);
    let norm = 1.0 / (nf * bw * (2.0 * std::f64::consts::PI).sqrt());
    at.iter()
        .map(|&x| {
            samples
                .iter()
                .map(|&s| (-0.5 * ((x - s) / bw).powi(2)).exp())
                .sum::<f64>()
                * norm
        })
        .collect()
}

/// Linear-interpolated quantile of a sorted slice.
pub(crate) fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
