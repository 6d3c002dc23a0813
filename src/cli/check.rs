use super::context::Context;
use originbind::gatekeeper::access_history::UNKNOWN_COUNTRY;
use originbind::gatekeeper::Decision;
use originbind::identity::{Identity, Origin};

/// Run one login attempt through the access gate
///
/// Prints `ALLOW` or `DENY: <message>`. The gate itself never waits on
/// geolocation. With `--country` the country is resolved up front, so the
/// gate reads it from the cache and no second lookup is issued; it is
/// printed on a second line.
pub async fn execute(
    ctx: &Context,
    identity: &str,
    origin: &str,
    name: &str,
    resolve_country: bool,
) -> Result<String, Box<dyn std::error::Error>> {
    let identity = Identity::parse(identity)?;
    let origin = Origin::parse(origin)?;

    let country = if resolve_country {
        Some(match &ctx.geo {
            Some(geo) => geo
                .country_of(&origin)
                .await
                .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string()),
            None => "disabled".to_string(),
        })
    } else {
        None
    };

    let decision = ctx.gate().on_pre_authentication(identity, &origin, name);

    let mut output = match decision {
        Decision::Allow => "ALLOW".to_string(),
        Decision::Deny(message) => format!("DENY: {}", message),
    };
    if let Some(country) = country {
        output.push_str(&format!("\nCountry: {}", country));
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::context::test_context;
    use tempfile::TempDir;

    const PLAYER: &str = "6f1c1f5e-8a4b-4c3e-9d2a-0b1c2d3e4f50";

    #[tokio::test]
    async fn test_first_contact_then_deny() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = test_context(temp_dir.path());

        let first = execute(&ctx, PLAYER, "1.2.3.4", "Steve", false).await.unwrap();
        assert_eq!(first, "ALLOW");

        let again = execute(&ctx, PLAYER, "1.2.3.4", "Steve", false).await.unwrap();
        assert_eq!(again, "ALLOW");

        let other = execute(&ctx, PLAYER, "9.9.9.9", "Steve", false).await.unwrap();
        assert!(other.starts_with("DENY: Unauthorized IP address"));
        assert_eq!(ctx.audit.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_inputs_rejected_without_mutation() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = test_context(temp_dir.path());

        assert!(execute(&ctx, "not-a-uuid", "1.2.3.4", "Steve", false).await.is_err());
        assert!(execute(&ctx, PLAYER, "999.1.1.1", "Steve", false).await.is_err());
        assert!(ctx.store.is_empty());
    }

    #[tokio::test]
    async fn test_country_flag_with_geo_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = test_context(temp_dir.path());

        let output = execute(&ctx, PLAYER, "1.2.3.4", "Steve", true).await.unwrap();
        assert_eq!(output, "ALLOW\nCountry: disabled");
    }
}
