pub mod lenient;
mod payload_decryptor;

pub use payload_decryptor::{ConfigurationError, DecryptionError, PayloadDecryptor};
