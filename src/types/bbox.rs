//! Geographic bounding boxes and their partition into fixed-size chunks.

use std::fmt;
use thiserror::Error;

/// Largest number of chunks a single partition may produce.
pub const MAX_CHUNKS: usize = 1_000_000;

#[derive(Debug, Error, PartialEq)]
pub enum PartitionError {
    #[error("Chunk size must be a positive finite number of degrees, got {0}")]
    InvalidChunkSize(f64),

    #[error("Chunk size {chunk_size} splits {bbox} into more than {} chunks", MAX_CHUNKS)]
    TooManyChunks { bbox: BoundingBox, chunk_size: f64 },
}

/// An axis-aligned box in degrees, `x` being longitude and `y` latitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn width(&self) -> f64 {
        (self.max_x - self.min_x).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.max_y - self.min_y).max(0.0)
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Area shared with `other`; zero when the boxes only touch along an edge.
    pub fn intersection_area(&self, other: &BoundingBox) -> f64 {
        let width = self.max_x.min(other.max_x) - self.min_x.max(other.min_x);
        let height = self.max_y.min(other.max_y) - self.min_y.max(other.min_y);
        if width <= 0.0 || height <= 0.0 {
            0.0
        } else {
            width * height
        }
    }

    /// Splits the box into a grid of `chunk_size` degree cells.
    ///
    /// Chunks are numbered column by column (all `y` cells of the first `x`
    /// column, then the next column). Cells in the last row and column are
    /// clipped to the box, so they can be smaller than `chunk_size`. A box with
    /// no width or height yields no chunks.
    ///
    /// Fails when `chunk_size` is not a positive finite number, or when the
    /// grid would hold more than [`MAX_CHUNKS`] cells.
    pub fn partition(&self, chunk_size: f64) -> Result<Vec<BBoxChunk>, PartitionError> {
        if !chunk_size.is_finite() || chunk_size <= 0.0 {
            return Err(PartitionError::InvalidChunkSize(chunk_size));
        }
        if self.width() <= 0.0 || self.height() <= 0.0 {
            return Ok(Vec::new());
        }
        let too_many = || PartitionError::TooManyChunks {
            bbox: *self,
            chunk_size,
        };
        let columns = (self.width() / chunk_size).ceil();
        let rows = (self.height() / chunk_size).ceil();
        if columns > MAX_CHUNKS as f64 || rows > MAX_CHUNKS as f64 {
            return Err(too_many());
        }
        let (columns, rows) = (columns as usize, rows as usize);
        let count = columns
            .checked_mul(rows)
            .filter(|count| *count <= MAX_CHUNKS)
            .ok_or_else(too_many)?;

        let mut chunks = Vec::with_capacity(count);
        for column in 0..columns {
            let x = self.min_x + column as f64 * chunk_size;
            if x >= self.max_x {
                break;
            }
            for row in 0..rows {
                let y = self.min_y + row as f64 * chunk_size;
                if y >= self.max_y {
                    break;
                }
                chunks.push(BBoxChunk {
                    id: chunks.len(),
                    bbox: BoundingBox::new(
                        x,
                        y,
                        (x + chunk_size).min(self.max_x),
                        (y + chunk_size).min(self.max_y),
                    ),
                });
            }
        }
        Ok(chunks)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.5}, {:.5}, {:.5}, {:.5}]",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

/// One cell of a partitioned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBoxChunk {
    /// Position in the partition order; stable across runs for the same box and size.
    pub id: usize,
    pub bbox: BoundingBox,
}
