/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Minimum frame count to use frame-level Rayon parallelism.
pub const PARALLEL_FRAME_THRESHOLD: usize = 4;

/// Minimum ROI count to extract traces in parallel.
pub const PARALLEL_ROI_THRESHOLD: usize = 4;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f64 = 1e-10;

/// ITU-R BT.601 luminance coefficient for the red channel.
pub const LUMINANCE_R: f32 = 0.299;

/// ITU-R BT.601 luminance coefficient for the green channel.
pub const LUMINANCE_G: f32 = 0.587;

/// ITU-R BT.601 luminance coefficient for the blue channel.
pub const LUMINANCE_B: f32 = 0.114;

/// Frame rate assumed when neither the caller nor the container supplies one.
pub const DEFAULT_FPS: f64 = 30.0;

/// SER timestamps are expressed in 100 ns ticks.
pub const SER_TICKS_PER_SECOND: f64 = 10_000_000.0;

/// Minimum number of distinct time points for a two-parameter decay fit.
pub const MIN_FIT_POINTS: usize = 3;

/// Maximum Levenberg-Marquardt iterations per model.
pub const FIT_MAX_ITERATIONS: usize = 200;

/// Relative change in the residual sum of squares that counts as converged.
pub const FIT_TOLERANCE: f64 = 1e-12;

/// Initial Levenberg-Marquardt damping factor.
pub const FIT_INITIAL_LAMBDA: f64 = 1e-3;

/// Damping factor above which the solver gives up.
pub const FIT_MAX_LAMBDA: f64 = 1e12;

/// Degree of the polynomial used to detrend pixel time series before
/// computing the fluctuation map.
pub const FLUCTUATION_DETREND_DEGREE: usize = 2;

/// Default percentile cutoff for auto-ROI candidate pixels.
pub const DEFAULT_THRESHOLD_PERCENTILE: f64 = 99.0;

/// Default minimum distance between auto-ROI centers, as a fraction of frame width.
pub const DEFAULT_MIN_DISTANCE_FRACTION: f64 = 0.01;

/// Default number of k-means clusters for auto-ROI trace grouping.
pub const DEFAULT_CLUSTER_COUNT: usize = 3;

/// Side length (pixels) of auto-detected ROI squares; roughly one soma.
pub const DEFAULT_AUTO_ROI_SIZE: usize = 10;

/// Upper bound on the number of ROIs a single auto-detection run may return.
pub const DEFAULT_MAX_AUTO_ROIS: usize = 500;

/// Maximum k-means iterations.
pub const KMEANS_MAX_ITERATIONS: usize = 100;

/// Retention factor of the exponential moving average at alpha = 1.
/// 0.95 corresponds to an effective window of roughly 20 samples.
pub const SMOOTHING_MAX_RETENTION: f64 = 0.95;

/// Weight of the first frame when blending the fluctuation overlay.
pub const OVERLAY_FRAME_WEIGHT: f32 = 0.6;

/// Weight of the colormapped fluctuation map in the overlay.
pub const OVERLAY_MAP_WEIGHT: f32 = 0.4;

/// Version tag written into ROI set JSON files.
pub const ROI_SET_VERSION: u32 = 1;
