//! COCO-style run-length encoded binary masks.
//!
//! Runs are laid out column-major and alternate 0/1 starting with a run of
//! zeros (possibly empty). `counts` is either a plain list of run lengths or
//! the compact string form: each run is a little-endian sequence of 5-bit
//! groups offset by ASCII 48, bit 0x20 marks a continuation, and from the
//! fourth run onward the value is stored as a delta against the run two
//! positions earlier.

use serde::{Deserialize, Serialize};

use crate::types::{DatasetError, DatasetResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RleMask {
    /// `[height, width]`.
    pub size: [u32; 2],
    pub counts: RleCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RleCounts {
    Compressed(String),
    Runs(Vec<u64>),
}

/// Dense binary mask, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    width: u32,
    height: u32,
    data: Vec<bool>,
}

impl BinaryMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![false; (width as usize) * (height as usize)],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.data[(y as usize) * (self.width as usize) + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, on: bool) {
        self.data[(y as usize) * (self.width as usize) + x as usize] = on;
    }

    /// Set every pixel in `[x0, x1) x [y0, y1)`, clamped to the mask.
    pub fn fill_rect(&mut self, x0: u32, y0: u32, x1: u32, y1: u32) {
        for y in y0..y1.min(self.height) {
            for x in x0..x1.min(self.width) {
                self.set(x, y, true);
            }
        }
    }

    pub fn count_on(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }

    /// `(x, y)` of every set pixel, row-major.
    pub fn on_pixels(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let width = self.width as usize;
        self.data
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .map(move |(i, _)| ((i % width) as u32, (i / width) as u32))
    }

    /// Mean `(x, y)` of the set pixels; `None` when the mask is empty.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        let mut sum_x = 0.0f64;
        let mut sum_y = 0.0f64;
        let mut n = 0usize;
        for (x, y) in self.on_pixels() {
            sum_x += x as f64;
            sum_y += y as f64;
            n += 1;
        }
        (n > 0).then(|| (sum_x / n as f64, sum_y / n as f64))
    }
}

impl RleMask {
    pub fn height(&self) -> u32 {
        self.size[0]
    }

    pub fn width(&self) -> u32 {
        self.size[1]
    }

    /// Run lengths, decoding the compact string form if needed.
    pub fn runs(&self) -> DatasetResult<Vec<u64>> {
        match &self.counts {
            RleCounts::Runs(runs) => Ok(runs.clone()),
            RleCounts::Compressed(s) => decode_counts(s),
        }
    }

    pub fn decode(&self) -> DatasetResult<BinaryMask> {
        let (width, height) = (self.width(), self.height());
        let runs = self.runs()?;
        let total = (width as u64) * (height as u64);
        let covered = checked_sum(runs.iter().copied())?;
        if covered != total {
            return Err(DatasetError::Rle {
                msg: format!("runs cover {covered} pixels, expected {total} ({width}x{height})"),
            });
        }

        let mut mask = BinaryMask::new(width, height);
        let h = height as u64;
        let mut pos = 0u64;
        for (i, run) in runs.iter().enumerate() {
            if i % 2 == 1 {
                for p in pos..pos + run {
                    mask.set((p / h) as u32, (p % h) as u32, true);
                }
            }
            pos += run;
        }
        Ok(mask)
    }

    /// Encode a mask in the compact string form.
    pub fn encode(mask: &BinaryMask) -> Self {
        let mut runs = Vec::new();
        let mut current = false;
        let mut len = 0u64;
        for x in 0..mask.width() {
            for y in 0..mask.height() {
                let v = mask.get(x, y);
                if v != current {
                    runs.push(len);
                    current = v;
                    len = 0;
                }
                len += 1;
            }
        }
        runs.push(len);
        RleMask {
            size: [mask.height(), mask.width()],
            counts: RleCounts::Compressed(encode_counts(&runs)),
        }
    }

    /// Number of set pixels, computed from the runs without decoding.
    pub fn area(&self) -> DatasetResult<u64> {
        checked_sum(self.runs()?.into_iter().skip(1).step_by(2))
    }
}

fn checked_sum(mut runs: impl Iterator<Item = u64>) -> DatasetResult<u64> {
    runs.try_fold(0u64, |acc, r| acc.checked_add(r))
        .ok_or_else(|| DatasetError::Rle {
            msg: "run lengths overflow".to_string(),
        })
}

fn decode_counts(s: &str) -> DatasetResult<Vec<u64>> {
    let bytes = s.as_bytes();
    let mut runs: Vec<i64> = Vec::new();
    let mut p = 0usize;
    while p < bytes.len() {
        let mut x: i64 = 0;
        let mut k = 0u32;
        loop {
            let Some(&byte) = bytes.get(p) else {
                return Err(DatasetError::Rle {
                    msg: format!("truncated run at byte {p}"),
                });
            };
            let c = i64::from(byte) - 48;
            if !(0..64).contains(&c) {
                return Err(DatasetError::Rle {
                    msg: format!("invalid counts character {:?} at byte {p}", byte as char),
                });
            }
            if k >= 12 {
                return Err(DatasetError::Rle {
                    msg: format!("run too long at byte {p}"),
                });
            }
            x |= (c & 0x1f) << (5 * k);
            p += 1;
            k += 1;
            if c & 0x20 == 0 {
                if c & 0x10 != 0 {
                    x |= -1i64 << (5 * k);
                }
                break;
            }
        }
        if runs.len() > 2 {
            x = x
                .checked_add(runs[runs.len() - 2])
                .ok_or_else(|| DatasetError::Rle {
                    msg: format!("run delta overflows at byte {p}"),
                })?;
        }
        runs.push(x);
    }
    runs.into_iter()
        .map(|r| {
            u64::try_from(r).map_err(|_| DatasetError::Rle {
                msg: format!("negative run length {r}"),
            })
        })
        .collect()
}

fn encode_counts(runs: &[u64]) -> String {
    let mut out = String::new();
    for (i, &run) in runs.iter().enumerate() {
        let mut x = run as i64;
        if i > 2 {
            x -= runs[i - 2] as i64;
        }
        loop {
            let mut c = x & 0x1f;
            x >>= 5;
            let more = if c & 0x10 != 0 { x != -1 } else { x != 0 };
            if more {
                c |= 0x20;
            }
            out.push((c + 48) as u8 as char);
            if !more {
                break;
            }
        }
    }
    out
}
