use crate::config::ZoomLevelStrategy;
use crate::error::Result;
use crate::geometry::Bounds;

/// Pick an overview level for a requested resolution.
///
/// `resolutions` holds the pixel size of every level, native first. Levels are
/// walked from coarsest to finest; level `i` wins once the target resolution is
/// more than `percentage` percent of the way from level `i` down to level `i - 1`.
pub fn select_overview_level(
    resolutions: &[f64],
    target_resolution: f64,
    percentage: u8,
) -> usize {
    let percentage = f64::from(percentage.min(100)) / 100.0;
    for i in (1..resolutions.len()).rev() {
        let current = resolutions[i];
        let higher = resolutions[i - 1];
        let threshold = current - (current - higher) * percentage;
        if target_resolution > threshold || target_resolution == current {
            return i;
        }
    }
    0
}

/// Overview selection with a validated zoom level strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverviewSelector {
    percentage: u8,
}

impl OverviewSelector {
    pub fn new(strategy: ZoomLevelStrategy) -> Result<Self> {
        Ok(Self {
            percentage: strategy.percentage()?,
        })
    }

    pub fn percentage(&self) -> u8 {
        self.percentage
    }

    /// Level best matching a read of `bounds` into `width` output columns.
    ///
    /// `decimations` are the overview factors relative to the native image.
    pub fn select(
        &self,
        native_resolution: f64,
        decimations: &[f64],
        bounds: &Bounds,
        width: usize,
    ) -> usize {
        let native_resolution = native_resolution.abs();
        let target_resolution = bounds.width().abs() / width.max(1) as f64;
        let resolutions: Vec<f64> = std::iter::once(native_resolution)
            .chain(
                decimations
                    .iter()
                    .map(|decimation| native_resolution * decimation),
            )
            .collect();
        select_overview_level(&resolutions, target_resolution, self.percentage)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const RESOLUTIONS: [f64; 4] = [10.0, 20.0, 40.0, 80.0];

    #[test]
    fn prefer_coarser_takes_coarsest_level_not_above_target() {
        assert_eq!(select_overview_level(&RESOLUTIONS, 5.0, 0), 0);
        assert_eq!(select_overview_level(&RESOLUTIONS, 10.0, 0), 0);
        assert_eq!(select_overview_level(&RESOLUTIONS, 20.0, 0), 1);
        assert_eq!(select_overview_level(&RESOLUTIONS, 39.9, 0), 1);
        assert_eq!(select_overview_level(&RESOLUTIONS, 40.0, 0), 2);
        assert_eq!(select_overview_level(&RESOLUTIONS, 500.0, 0), 3);
    }

    #[test]
    fn full_percentage_switches_as_soon_as_the_finer_level_is_passed() {
        assert_eq!(select_overview_level(&RESOLUTIONS, 10.0, 100), 0);
        assert_eq!(select_overview_level(&RESOLUTIONS, 10.5, 100), 1);
        assert_eq!(select_overview_level(&RESOLUTIONS, 20.0, 100), 1);
        assert_eq!(select_overview_level(&RESOLUTIONS, 20.5, 100), 2);
        assert_eq!(select_overview_level(&RESOLUTIONS, 41.0, 100), 3);
    }

    #[test]
    fn blend_switches_halfway() {
        assert_eq!(select_overview_level(&RESOLUTIONS, 29.0, 50), 1);
        assert_eq!(select_overview_level(&RESOLUTIONS, 31.0, 50), 2);
        assert_eq!(select_overview_level(&RESOLUTIONS, 14.0, 50), 0);
        assert_eq!(select_overview_level(&RESOLUTIONS, 16.0, 50), 1);
    }

    #[test]
    fn finer_targets_never_pick_coarser_levels() {
        let targets: Vec<f64> = (1..2000).map(|i| i as f64 * 0.07).collect();
        for percentage in [0u8, 10, 25, 50, 75, 90, 100] {
            let levels: Vec<usize> = targets
                .iter()
                .map(|target| select_overview_level(&RESOLUTIONS, *target, percentage))
                .collect();
            assert!(
                levels.windows(2).all(|pair| pair[0] <= pair[1]),
                "not monotonic for {percentage}%"
            );
        }
    }

    #[test]
    fn single_level_is_always_native() {
        assert_eq!(select_overview_level(&[10.0], 1000.0, 50), 0);
        assert_eq!(select_overview_level(&[], 1000.0, 50), 0);
    }

    #[test]
    fn selector_uses_request_resolution() {
        let selector = OverviewSelector::new(ZoomLevelStrategy::default()).unwrap();
        assert_eq!(selector.percentage(), 50);
        // 64 native pixels of 10 units read into 16 columns: 40 units per pixel
        let bounds = Bounds::new(1000.0, 4360.0, 1640.0, 5000.0);
        assert_eq!(selector.select(10.0, &[2.0, 4.0, 8.0], &bounds, 16), 2);
        assert_eq!(selector.select(10.0, &[2.0, 4.0, 8.0], &bounds, 64), 0);
        assert_eq!(selector.select(10.0, &[], &bounds, 1), 0);
    }

    #[test]
    fn fractional_decimations_from_rounded_up_overviews() {
        let selector = OverviewSelector::new(ZoomLevelStrategy::default()).unwrap();
        // 1001 native columns with overviews of 501, 251 and 126 columns
        let decimations = [1001.0 / 501.0, 1001.0 / 251.0, 1001.0 / 126.0];
        let bounds = Bounds::new(1000.0, 0.0, 11010.0, 10010.0);
        // 25.025 units per output pixel sits below the 1-2 midpoint of ~29.97
        assert_eq!(selector.select(10.0, &decimations, &bounds, 400), 1);
        assert_eq!(selector.select(10.0, &decimations, &bounds, 300), 2);
    }

    #[test]
    fn invalid_strategy_is_rejected() {
        assert!(OverviewSelector::new(ZoomLevelStrategy::Blend(101)).is_err());
    }
}
