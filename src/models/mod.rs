pub mod token;

pub use token::{
    format_timestamp, Activation, ActivationMode, Deactivation, Expiry, Registration, TokenPatch,
    TokenRecord, Validity,
};
