pub mod dispatcher;
pub mod executor;
pub mod observer;
pub mod pipeline;

pub use dispatcher::TaskDispatcher;
pub use executor::{JobExecutor, Outcome};
pub use observer::{ChangeObserver, ObserverAction};
pub use pipeline::Pipeline;
