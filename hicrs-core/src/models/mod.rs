pub mod bin_table;
pub mod chromosome;
pub mod count;
pub mod interval;
pub mod pixel;

// re-export for cleaner imports
pub use self::bin_table::{Bin, BinTable, BinTableKind};
pub use self::chromosome::{Chromosome, Reference};
pub use self::count::{Count, CountType, CountValue};
pub use self::interval::{GenomicInterval, QueryType};
pub use self::pixel::{Pixel, ThinPixel};
