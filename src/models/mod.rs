pub mod actor;
pub mod location;
pub mod notification;
pub mod parcel;
pub mod tracking;
