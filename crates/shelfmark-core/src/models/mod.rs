pub mod identifiers;
pub mod record;
pub mod region;

pub use identifiers::IdentifierSet;
pub use record::{CanonicalRecord, SeriesInfo};
pub use region::Region;
