pub mod allocator;
pub mod capacity;
pub mod duration;
pub mod locks;
pub mod notifier;
pub mod reschedule;
pub mod scheduling;
pub mod sequencer;
pub mod store;
pub mod supabase_store;

pub use allocator::*;
pub use capacity::*;
pub use duration::*;
pub use locks::*;
pub use notifier::*;
pub use reschedule::*;
pub use scheduling::*;
pub use sequencer::*;
pub use store::*;
pub use supabase_store::*;
