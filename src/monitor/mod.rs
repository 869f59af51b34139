//! Archive stability monitoring and background extraction
//!
//! Downloads land archive volumes on disk a piece at a time. The
//! [`ExtractionScheduler`] scans the root on an interval, waits until every
//! volume of an archive has kept the same size for a while, then extracts it
//! next to itself exactly once. Time and the filesystem are injected through
//! [`Clock`] and [`FsProbe`] so the whole cycle runs under test without sleeps.

mod clock;
mod extractor;
mod ledger;
mod probe;
mod scheduler;
mod stability;


pub use clock::{Clock, ManualClock, SystemClock};
pub use extractor::{
    ExtractionOutcome, Extractor, NativeExtractor, SevenZipCli, default_extractor,
};
pub use ledger::{ExtractionLedger, ExtractionState, LedgerEntry};
pub use probe::{FsProbe, LocalFs, is_primary_archive};
pub use scheduler::{ExtractionScheduler, TickSummary};
pub use stability::{Stability, StabilityTracker};
