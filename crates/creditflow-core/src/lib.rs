pub mod activity;
pub mod application;
pub mod attachment;
pub mod detail;
pub mod identity;
pub mod participant;

pub use activity::{Activity, ActivityStatus, Category, ReviewDecision};
pub use application::{Application, ApplicationStatus};
pub use attachment::{Attachment, FileKind, UploadLimits};
pub use detail::CategoryDetail;
pub use identity::{Identity, UserProfile, UserType};
pub use participant::Participant;
