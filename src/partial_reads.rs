use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::try_join_all;
use futures::stream::{FuturesUnordered, TryStreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, trace};

use crate::error::{CogWindowError, Result};
use crate::geometry::TileMetadata;
use crate::header::CogHeader;
use crate::mosaic::{MaskedArray, Mosaic};
use crate::sample::Sample;
use crate::source::{RangeReader, RequestStats};

/// Everything a fetcher needs for one partial read.
pub struct FetchContext<'a, T> {
    pub reader: &'a dyn RangeReader,
    pub header: &'a Arc<CogHeader<T>>,
    pub stats: &'a RequestStats,
}

impl<T> Clone for FetchContext<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for FetchContext<'_, T> {}

/// Populates the fused buffer of a partial read.
#[async_trait]
pub trait TileFetcher<T: Sample>: Send + Sync {
    /// Fetch, decode and stitch every tile of `meta`'s tile range.
    ///
    /// Tiles of the range that fall outside the image's tile grid are not
    /// requested; their slots stay zero and, when a mask is attached, invalid.
    /// The first failure aborts the whole read.
    async fn fetch(&self, ctx: FetchContext<'_, T>, meta: &TileMetadata) -> Result<Mosaic<T>>;
}

/// Decode one tile on the blocking pool.
///
/// The decode permit moves into the blocking task, so a decode that outlives a
/// cancelled read still counts against the limit until it finishes.
pub(crate) async fn decode_in_background<T: Sample>(
    header: &Arc<CogHeader<T>>,
    permits: &Arc<Semaphore>,
    level: usize,
    image: Bytes,
    mask: Option<Bytes>,
) -> Result<MaskedArray<T>> {
    let permit = Arc::clone(permits)
        .acquire_owned()
        .await
        .map_err(|err| CogWindowError::General(err.to_string()))?;
    let header = Arc::clone(header);
    tokio::task::spawn_blocking(move || {
        let _permit = permit;
        header.decode_tile(level, image, mask)
    })
    .await?
}

/// Request the image tile (and its mask tile) at `(x, y)` and decode it.
pub(crate) async fn fetch_tile<T: Sample>(
    ctx: FetchContext<'_, T>,
    permits: &Arc<Semaphore>,
    level: usize,
    x: usize,
    y: usize,
) -> Result<MaskedArray<T>> {
    let ifd = ctx.header.ifds().image(level)?;
    let index = ifd.tiles().tile_index(x, y);
    let (start, length) = ifd.tiles().range(index)?;
    let image = ctx.reader.range_request(start, length, ctx.stats);

    let (image, mask) = match ctx.header.ifds().mask(level)? {
        Some(mask_ifd) => {
            let (mask_start, mask_length) = mask_ifd.tiles().range(index)?;
            let mask = ctx.reader.range_request(mask_start, mask_length, ctx.stats);
            let (image, mask) = futures::try_join!(image, mask)?;
            (image, Some(mask))
        }
        None => (image.await?, None),
    };
    trace!(x, y, level, "fetched tile");
    decode_in_background(ctx.header, permits, level, image, mask).await
}

/// One range request per tile, all tiles in flight at once.
#[derive(Debug, Clone)]
pub struct PerTileFetcher {
    permits: Arc<Semaphore>,
}

impl PerTileFetcher {
    pub fn new(permits: Arc<Semaphore>) -> Self {
        Self { permits }
    }
}

#[async_trait]
impl<T: Sample> TileFetcher<T> for PerTileFetcher {
    async fn fetch(&self, ctx: FetchContext<'_, T>, meta: &TileMetadata) -> Result<Mosaic<T>> {
        let level = meta.overview_level;
        let grid = ctx.header.ifds().image(level)?.tiles();
        let permits = &self.permits;
        let mut mosaic = Mosaic::new(meta, ctx.header.add_mask());

        let mut tasks = FuturesUnordered::new();
        for (x, y, grid_x, grid_y) in meta.tiles() {
            if !grid.contains(x, y) {
                mosaic.invalidate(grid_x, grid_y)?;
                continue;
            }
            tasks.push(async move {
                let tile = fetch_tile(ctx, permits, level, x as usize, y as usize).await?;
                Ok::<_, CogWindowError>((grid_x, grid_y, tile))
            });
        }
        debug!(
            level,
            tiles = tasks.len(),
            xmin = meta.xmin,
            xmax = meta.xmax,
            ymin = meta.ymin,
            ymax = meta.ymax,
            "requesting tiles"
        );

        // returning early drops, and so cancels, every request still in flight
        while let Some((grid_x, grid_y, tile)) = tasks.try_next().await? {
            mosaic.stitch(tile, grid_x, grid_y)?;
        }
        Ok(mosaic)
    }
}

/// One range request per row of tiles (plus one for the mask row), split back
/// into tiles locally.
#[derive(Debug, Clone)]
pub struct MergedRangeFetcher {
    permits: Arc<Semaphore>,
}

impl MergedRangeFetcher {
    pub fn new(permits: Arc<Semaphore>) -> Self {
        Self { permits }
    }

    /// Fetch the tiles `columns` of tile row `row`, returning `(grid_x, tile)` pairs.
    ///
    /// `columns` holds `(tile_x, grid_x)` in increasing tile order.
    async fn fetch_row<T: Sample>(
        &self,
        ctx: FetchContext<'_, T>,
        level: usize,
        row: usize,
        columns: Vec<(usize, usize)>,
    ) -> Result<Vec<(usize, MaskedArray<T>)>> {
        let ifd = ctx.header.ifds().image(level)?;
        let mask_ifd = ctx.header.ifds().mask(level)?;
        let indices: Vec<usize> = columns
            .iter()
            .map(|(x, _)| ifd.tiles().tile_index(*x, row))
            .collect();
        let (first, last) = match (indices.first(), indices.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Ok(vec![]),
        };

        let (start, length) = ifd.tiles().merged_range(first, last)?;
        let image_row = ctx.reader.range_request(start, length, ctx.stats);
        let (image_row, mask_row) = match mask_ifd {
            Some(mask_ifd) => {
                let (mask_start, mask_length) = mask_ifd.tiles().merged_range(first, last)?;
                let mask_row = ctx.reader.range_request(mask_start, mask_length, ctx.stats);
                let (image_row, mask_row) = futures::try_join!(image_row, mask_row)?;
                (image_row, Some((mask_ifd, mask_row, mask_start)))
            }
            None => (image_row.await?, None),
        };
        trace!(row, level, tiles = indices.len(), "fetched merged row");

        let mut pending = Vec::with_capacity(indices.len());
        for ((_, grid_x), index) in columns.iter().zip(&indices) {
            let image = ifd.tiles().extract(&image_row, *index, start)?;
            let mask = match &mask_row {
                Some((mask_ifd, bytes, mask_start)) => {
                    Some(mask_ifd.tiles().extract(bytes, *index, *mask_start)?)
                }
                None => None,
            };
            pending.push((*grid_x, image, mask));
        }

        try_join_all(pending.into_iter().map(|(grid_x, image, mask)| async move {
            let tile =
                decode_in_background(ctx.header, &self.permits, level, image, mask).await?;
            Ok::<_, CogWindowError>((grid_x, tile))
        }))
        .await
    }
}

#[async_trait]
impl<T: Sample> TileFetcher<T> for MergedRangeFetcher {
    async fn fetch(&self, ctx: FetchContext<'_, T>, meta: &TileMetadata) -> Result<Mosaic<T>> {
        let level = meta.overview_level;
        let grid = ctx.header.ifds().image(level)?.tiles();
        let mut mosaic = Mosaic::new(meta, ctx.header.add_mask());

        let mut rows = FuturesUnordered::new();
        for y in meta.ymin..=meta.ymax {
            let grid_y = (y - meta.ymin) as usize;
            let mut columns = vec![];
            for x in meta.xmin..=meta.xmax {
                let grid_x = (x - meta.xmin) as usize;
                if grid.contains(x, y) {
                    columns.push((x as usize, grid_x));
                } else {
                    mosaic.invalidate(grid_x, grid_y)?;
                }
            }
            if columns.is_empty() {
                continue;
            }
            let row = self.fetch_row(ctx, level, y as usize, columns);
            rows.push(async move { Ok::<_, CogWindowError>((grid_y, row.await?)) });
        }
        debug!(
            level,
            rows = rows.len(),
            xmin = meta.xmin,
            xmax = meta.xmax,
            ymin = meta.ymin,
            ymax = meta.ymax,
            "requesting merged rows"
        );

        while let Some((grid_y, tiles)) = rows.try_next().await? {
            for (grid_x, tile) in tiles {
                mosaic.stitch(tile, grid_x, grid_y)?;
            }
        }
        Ok(mosaic)
    }
}
