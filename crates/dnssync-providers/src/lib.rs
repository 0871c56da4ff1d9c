// # dnssync-providers
//
// Server adapters for the DNS-admin products dns-sync can mirror between.
//
// | Type tag     | Product        | Auth fields                 | Records  |
// |--------------|----------------|-----------------------------|----------|
// | `pihole`     | Pi-hole v6     | `password`                  | A, CNAME |
// | `adguard`    | AdGuard Home   | `username`, `password`      | A, CNAME |
// | `technitium` | Technitium DNS | `api_token`                 | A, CNAME |
// | `cloudflare` | Cloudflare     | `api_token`, `zone_id`      | A, CNAME |
// | `opnsense`   | OPNsense       | `api_key`, `api_secret`     | A        |
//
// Each vendor sits behind a cargo feature of the same name (all enabled by
// default) and registers a factory under its type tag.
//
// ## Shared behavior
//
// - Every request carries the server's configured timeout
// - Transient failures (connection errors, 429, 5xx) are retried with the
//   server's bounded linear backoff; 401/403 fail immediately
// - A write the server refuses is `Ok(false)`, never an error
// - Secrets never appear in `Debug` output or logs
//
// ## Usage
//
// ```rust,ignore
// let registry = dnssync_core::AdapterRegistry::new();
// dnssync_providers::register(&registry);
// ```

pub mod http;

#[cfg(feature = "adguard")]
pub mod adguard;
#[cfg(feature = "cloudflare")]
pub mod cloudflare;
#[cfg(feature = "opnsense")]
pub mod opnsense;
#[cfg(feature = "pihole")]
pub mod pihole;
#[cfg(feature = "technitium")]
pub mod technitium;

use dnssync_core::AdapterRegistry;

/// Register every adapter compiled into this build
pub fn register(registry: &AdapterRegistry) {
    #[cfg(feature = "pihole")]
    pihole::register(registry);
    #[cfg(feature = "adguard")]
    adguard::register(registry);
    #[cfg(feature = "technitium")]
    technitium::register(registry);
    #[cfg(feature = "cloudflare")]
    cloudflare::register(registry);
    #[cfg(feature = "opnsense")]
    opnsense::register(registry);

    tracing::debug!("Registered adapters: {:?}", registry.list_adapters());
}
