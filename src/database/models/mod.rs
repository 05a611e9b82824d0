pub mod notification;
pub mod profile;
pub mod property;
pub mod property_request;
pub mod saved_property;
pub mod scheduled_viewing;

pub use notification::{Notification, NotificationStatus};
pub use profile::Profile;
pub use property::Property;
pub use property_request::{PropertyRequest, RequestStatusHistory};
pub use saved_property::SavedProperty;
pub use scheduled_viewing::ScheduledViewing;
