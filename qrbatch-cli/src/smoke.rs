//! Placeholder encoder for smoke runs.
//!
//! The real QR encoder lives in the embedding application; the CLI only
//! needs something deterministic that exercises the pipeline. This one
//! renders a QR-looking module grid from a hash of the payload, so the
//! same payload always produces byte-identical PNG output.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;

use image::{GrayImage, Luma};

use qrbatch::encoder::{QrEncodeError, QrEncoder};

/// Modules per side of the rendered grid.
const MODULES: u32 = 25;

/// Pixels per module.
const SCALE: u32 = 8;

/// Deterministic stand-in for a real QR encoder.
///
/// Failure injection is hash-based rather than random: with a fail rate
/// of 30, the same 30% of payloads fail on every invocation, which keeps
/// smoke runs reproducible. With a flaky budget set, an injected payload
/// fails that many attempts and then succeeds, which exercises the retry
/// path end to end.
pub struct SmokeEncoder {
    fail_rate: u8,
    flaky_budget: Option<u32>,
    attempts: Mutex<HashMap<String, u32>>,
}

impl SmokeEncoder {
    /// Create an encoder failing `fail_rate` percent of payloads,
    /// permanently or for `flaky_budget` attempts each.
    pub fn new(fail_rate: u8, flaky_budget: Option<u32>) -> Self {
        Self {
            fail_rate,
            flaky_budget,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    fn should_fail(&self, payload: &str) -> bool {
        if self.fail_rate == 0 {
            return false;
        }
        if fnv1a(payload.as_bytes()) % 100 >= u64::from(self.fail_rate) {
            return false;
        }
        match self.flaky_budget {
            None => true,
            Some(budget) => {
                let mut attempts = self.attempts.lock().unwrap();
                let seen = attempts.entry(payload.to_string()).or_insert(0);
                *seen += 1;
                *seen <= budget
            }
        }
    }
}

impl QrEncoder for SmokeEncoder {
    fn encode(&self, payload: &str) -> Result<Vec<u8>, QrEncodeError> {
        if self.should_fail(payload) {
            return Err(QrEncodeError::new("injected smoke failure"));
        }
        render_png(payload).map_err(|e| QrEncodeError::new(e.to_string()))
    }
}

/// Render the payload's module grid as a PNG.
fn render_png(payload: &str) -> Result<Vec<u8>, image::ImageError> {
    let seed = fnv1a(payload.as_bytes());
    let size = MODULES * SCALE;

    let img = GrayImage::from_fn(size, size, |x, y| {
        if module_on(seed, x / SCALE, y / SCALE) {
            Luma([0u8])
        } else {
            Luma([255u8])
        }
    });

    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, image::ImageFormat::Png)?;
    Ok(cursor.into_inner())
}

/// Finder-pattern corners plus hash-derived interior modules.
///
/// Looks like a QR symbol in a viewer; it is not a decodable one.
fn module_on(seed: u64, x: u32, y: u32) -> bool {
    if let Some((dx, dy)) = finder_offset(x, y) {
        let border = dx == 0 || dy == 0 || dx == 6 || dy == 6;
        let core = (2..=4).contains(&dx) && (2..=4).contains(&dy);
        return border || core;
    }

    let mut h = seed ^ ((u64::from(x) << 32) | u64::from(y));
    h = h.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    h ^= h >> 29;
    h & 1 == 1
}

/// Offset into a 7x7 finder square, if (x, y) falls inside one.
fn finder_offset(x: u32, y: u32) -> Option<(u32, u32)> {
    let corners = [(0, 0), (MODULES - 7, 0), (0, MODULES - 7)];
    corners
        .iter()
        .find(|(cx, cy)| x >= *cx && x < cx + 7 && y >= *cy && y < cy + 7)
        .map(|(cx, cy)| (x - cx, y - cy))
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xCBF2_9CE4_8422_2325u64;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x100_0000_01B3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_payload_same_bytes() {
        let encoder = SmokeEncoder::new(0, None);

        let first = encoder.encode("https://qr.example/i/a").unwrap();
        let second = encoder.encode("https://qr.example/i/a").unwrap();

        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_different_payloads_differ() {
        let encoder = SmokeEncoder::new(0, None);

        let a = encoder.encode("https://qr.example/i/a").unwrap();
        let b = encoder.encode("https://qr.example/i/b").unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn test_output_is_png() {
        let encoder = SmokeEncoder::new(0, None);

        let data = encoder.encode("https://qr.example/i/a").unwrap();

        assert_eq!(&data[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_full_fail_rate_fails_everything() {
        let encoder = SmokeEncoder::new(100, None);

        assert!(encoder.encode("x").is_err());
        assert!(encoder.encode("y").is_err());
        // Permanent injection keeps failing on retry.
        assert!(encoder.encode("x").is_err());
    }

    #[test]
    fn test_flaky_budget_recovers() {
        let encoder = SmokeEncoder::new(100, Some(2));

        assert!(encoder.encode("x").is_err());
        assert!(encoder.encode("x").is_err());
        assert!(encoder.encode("x").is_ok());
        // Other payloads have their own budgets.
        assert!(encoder.encode("y").is_err());
    }

    #[test]
    fn test_fail_rate_is_deterministic() {
        let first = SmokeEncoder::new(50, None);
        let second = SmokeEncoder::new(50, None);

        for n in 0..20 {
            let payload = format!("https://qr.example/i/item-{n:03}");
            assert_eq!(
                first.encode(&payload).is_ok(),
                second.encode(&payload).is_ok()
            );
        }
    }
}
