//! Secret generation.

use orchard_storefront::config::generate_secret;

use super::CommandError;

/// Shortest secret the storefront accepts.
const MIN_LENGTH: usize = 32;

/// Print a random secret for `STOREFRONT_SESSION_SECRET`.
///
/// # Errors
///
/// Returns an error if `length` is below the storefront's minimum.
pub fn generate(length: usize) -> Result<(), CommandError> {
    if length < MIN_LENGTH {
        return Err(CommandError::SecretTooShort(length, MIN_LENGTH));
    }

    #[allow(clippy::print_stdout)]
    {
        println!("{}", generate_secret(length));
    }
    Ok(())
}
