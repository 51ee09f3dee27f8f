/// Authentication and authorization utilities
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and the registration policy
/// - [`jwt`]: Access and refresh tokens for pilots
/// - [`middleware`]: Bearer token middleware and the `AuthContext` extractor
/// - [`authorization`]: Organizer and owner checks
///
/// # Example
///
/// ```no_run
/// use towclub_shared::auth::password::{hash_password, verify_password};
/// use towclub_shared::auth::jwt::issue_token_pair;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("windenstart1")?;
/// assert!(verify_password("windenstart1", &hash)?);
///
/// let tokens = issue_token_pair(Uuid::new_v4(), "secret-key-of-at-least-32-bytes!")?;
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;
