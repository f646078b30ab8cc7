pub mod clock;
pub mod locker;

#[allow(unused_imports)]
pub use clock::{Clock, ManualClock, SystemClock};
#[allow(unused_imports)]
pub use locker::PlanLock;
