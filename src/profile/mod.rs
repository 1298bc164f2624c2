mod profiles;

pub use profiles::{default_profiles_dir, ConnectionParams, ProfileLoader, PROFILES_FILE};
