pub mod password;

pub use password::{
    hash_password, password_strength, verify_password, HashingConfig, Password, PasswordHashString,
    PasswordStrength, StrengthBand, StrengthRequirements,
};
