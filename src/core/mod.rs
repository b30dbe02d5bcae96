pub mod error;
pub mod model;
pub mod row;

pub use error::{Result, SyncError};
pub use model::{Contact, Customer, Offer, Table, Task};
pub use row::{ChildRow, CountedParent, Keyed, ProjectedRow, SoftDeletable, adjust_count};
