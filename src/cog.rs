use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use crate::config::ReaderConfig;
use crate::error::{CogWindowError, Result};
use crate::geometry::{Bounds, OutputShape, TileMetadata};
use crate::header::CogHeader;
use crate::mosaic::MaskedArray;
use crate::overview::OverviewSelector;
use crate::partial_reads::{
    fetch_tile, FetchContext, MergedRangeFetcher, PerTileFetcher, TileFetcher,
};
use crate::postprocess::postprocess;
use crate::resample::ResampleMethod;
use crate::sample::Sample;
use crate::source::{
    CachedRangeReader, ObjectStoreReader, RangeReader, RequestStats, DEFAULT_BLOCK_CACHE_BYTES,
};

/// Result of a partial read: the (masked) array and how it was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialRead<T> {
    pub array: MaskedArray<T>,
    pub metadata: TileMetadata,
}

pub struct COGReader<T: Sample> {
    reader: Arc<dyn RangeReader>,
    header: Arc<CogHeader<T>>,
    config: ReaderConfig,
    selector: OverviewSelector,
    fetcher: Box<dyn TileFetcher<T>>,
    permits: Arc<Semaphore>,
}

impl<T: Sample> COGReader<T> {
    /// Validates `config` before any request is made.
    pub fn new(
        reader: Arc<dyn RangeReader>,
        header: CogHeader<T>,
        config: ReaderConfig,
    ) -> Result<Self> {
        config.validate()?;
        let reader: Arc<dyn RangeReader> = if config.enable_block_cache {
            Arc::new(CachedRangeReader::new(reader, DEFAULT_BLOCK_CACHE_BYTES))
        } else {
            reader
        };
        let selector = OverviewSelector::new(config.zoom_level_strategy)?;
        let permits = Arc::new(Semaphore::new(config.decode_concurrency));
        let fetcher: Box<dyn TileFetcher<T>> = if config.merge_consecutive_ranges {
            Box::new(MergedRangeFetcher::new(permits.clone()))
        } else {
            Box::new(PerTileFetcher::new(permits.clone()))
        };
        Ok(Self {
            reader,
            header: Arc::new(header),
            config,
            selector,
            fetcher,
            permits,
        })
    }

    /// Open `location` (`http(s)://`, `s3://`, `file://` or a local path).
    pub fn open(location: &str, header: CogHeader<T>, config: ReaderConfig) -> Result<Self> {
        let reader = ObjectStoreReader::from_location(location)?;
        Self::new(Arc::new(reader), header, config)
    }

    pub fn header(&self) -> &CogHeader<T> {
        &self.header
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn location(&self) -> String {
        self.reader.location()
    }

    /// Read the pixels inside `bounds`.
    ///
    /// Without an output shape the native resolution window is returned as is.
    /// With one, an overview level is picked for it and the window is resampled
    /// to exactly `shape`.
    pub async fn read(
        &self,
        bounds: &Bounds,
        shape: Option<OutputShape>,
        resample_method: ResampleMethod,
    ) -> Result<PartialRead<T>> {
        let stats = RequestStats::new();
        self.read_with_stats(bounds, shape, resample_method, &stats)
            .await
    }

    /// [`Self::read`], recording every range request in `stats`.
    pub async fn read_with_stats(
        &self,
        bounds: &Bounds,
        shape: Option<OutputShape>,
        resample_method: ResampleMethod,
        stats: &RequestStats,
    ) -> Result<PartialRead<T>> {
        if let Some(shape) = shape {
            if shape.width == 0 || shape.height == 0 {
                return Err(CogWindowError::Config(format!(
                    "output shape {}x{} is empty",
                    shape.width, shape.height
                )));
            }
        }
        if !bounds.intersects(&self.header.native_bounds()) {
            return Err(CogWindowError::OutOfBounds);
        }

        let level = match shape {
            Some(shape) => self.selector.select(
                self.header.geotransform(0)?.a(),
                &self.header.overviews(),
                bounds,
                shape.width,
            ),
            None => 0,
        };
        let ifd = self.header.ifds().image(level)?;
        let metadata = TileMetadata::compute(
            bounds,
            &self.header.geotransform(level)?,
            (ifd.tile_width(), ifd.tile_height()),
            ifd.bands(),
            T::DATA_TYPE,
            level,
        )?;
        debug!(
            location = %self.reader.location(),
            level,
            width = metadata.width,
            height = metadata.height,
            origin_x = metadata.origin_x,
            origin_y = metadata.origin_y,
            "partial read"
        );

        let ctx = FetchContext {
            reader: self.reader.as_ref(),
            header: &self.header,
            stats,
        };
        let mosaic = self.fetcher.fetch(ctx, &metadata).await?;
        let array = postprocess(&mosaic.into_inner(), &metadata, shape, resample_method);
        Ok(PartialRead { array, metadata })
    }

    /// Request an internal image tile at column `x`, row `y` of overview level `z`.
    pub async fn get_tile(&self, x: i64, y: i64, z: usize) -> Result<MaskedArray<T>> {
        let stats = RequestStats::new();
        self.get_tile_with_stats(x, y, z, &stats).await
    }

    pub async fn get_tile_with_stats(
        &self,
        x: i64,
        y: i64,
        z: usize,
        stats: &RequestStats,
    ) -> Result<MaskedArray<T>> {
        let ifd = self.header.ifds().image(z)?;
        if !ifd.tiles().contains(x, y) {
            return Err(CogWindowError::TileNotFound { x, y, z });
        }
        let ctx = FetchContext {
            reader: self.reader.as_ref(),
            header: &self.header,
            stats,
        };
        fetch_tile(ctx, &self.permits, z, x as usize, y as usize).await
    }
}
