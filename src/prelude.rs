//! Commonly used types, for glob import by reconcilers

pub use crate::client::{Client, KubeClient, Propagation, WatchEvent, Watcher};
pub use crate::config::OperatorConfig;
pub use crate::controller::reconciler::{reconciler_fn, ReconcileContext, Reconciler};
pub use crate::error::{ClientError, ConfigError, OperatorError};
pub use crate::operator::{Operator, OperatorBuilder};
pub use crate::reconcile::{absence, absence_propagated, apply, merge_metadata, presence};
pub use crate::resource::{Resource, ResourceType};
pub use crate::store::Store;
