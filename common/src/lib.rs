pub mod alert;
pub mod error;
pub mod heartbeat;
pub mod ids;
pub mod liveness;

pub use alert::{Alert, AlertKind, PersistedAlertKind, Severity};
pub use error::CommonError;
pub use heartbeat::{
    ApplicationStats, CameraInfo, CameraStatus, Heartbeat, LocationInfo, NetworkInfo, SystemStats,
};
pub use ids::StoreId;
pub use liveness::StoreStatus;
