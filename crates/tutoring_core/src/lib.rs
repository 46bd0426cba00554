pub mod domain;
pub mod entitlement;
pub mod locator;
pub mod phone;
pub mod ports;
pub mod routing;
pub mod service;

pub use domain::{
    AccessControl, LocatedStudent, PurchaseReceipt, SessionFilter, SessionProgress, SessionRecord,
    SessionStats, SessionStatus, StudentRecord, TransactionKind, TransactionRecord, Video,
    VideoSource,
};
pub use entitlement::Entitlement;
pub use locator::StudentLocator;
pub use phone::PhoneVariants;
pub use ports::{DatabaseService, PortError, PortResult};
pub use routing::{Route, RoutingTable};
pub use service::{
    AccessReport, AccessService, AttendanceOutcome, PurchaseOutcome, ServiceError, ServiceResult,
    SessionTarget,
};
