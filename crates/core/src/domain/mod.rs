pub mod credentials;
pub mod invoice;
