pub mod password;
pub mod token;

pub use password::{hash_password, verify_password, Password, PasswordHashString};
pub use token::{
    generate_numeric_code, generate_random_encoded_bytes, generate_random_token, sha256_hex,
};
