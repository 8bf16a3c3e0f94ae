//! Certificate store scenarios (S5): reuse, SAN drift, and expiry margin.
//!
//! RSA key generation makes these the slowest tests in the suite; each
//! test keeps the number of generations minimal.

use std::net::Ipv4Addr;

use acp_proxy::tls::{CertMeta, CertStore, RENEWAL_MARGIN_DAYS, VALIDITY_DAYS};

/// S5: a restart with unchanged LAN IPs reuses the cached pair; adding a
/// LAN IP regenerates with the new address in the recorded SANs.
#[test]
fn reuse_then_regenerate_on_san_drift() {
    let dir = tempfile::tempdir().unwrap();
    let store = CertStore::new(dir.path());
    let ips = vec![Ipv4Addr::new(192, 168, 1, 10)];

    let first = store.load_or_generate(&ips).unwrap();
    assert!(first.regenerated, "first start must generate");
    assert!(dir.path().join("key.pem").exists());
    assert!(dir.path().join("cert.pem").exists());
    assert!(dir.path().join("cert-meta.json").exists());
    assert!(first.cert_pem.contains("BEGIN CERTIFICATE"));
    assert!(first.key_pem.contains("PRIVATE KEY"));

    // Same address set: the fingerprint survives the restart.
    let second = store.load_or_generate(&ips).unwrap();
    assert!(!second.regenerated, "unchanged LAN set must reuse");
    assert_eq!(second.fingerprint, first.fingerprint);

    // A new LAN address forces a fresh certificate covering it.
    let grown = vec![Ipv4Addr::new(192, 168, 1, 10), Ipv4Addr::new(10, 0, 0, 5)];
    let third = store.load_or_generate(&grown).unwrap();
    assert!(third.regenerated, "SAN drift must regenerate");
    assert_ne!(third.fingerprint, first.fingerprint);

    let meta: CertMeta = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("cert-meta.json")).unwrap(),
    )
    .unwrap();
    assert!(meta.san_ips.iter().any(|ip| ip == "10.0.0.5"));
    assert!(meta.san_ips.iter().any(|ip| ip == "192.168.1.10"));
    assert!(meta.san_ips.iter().any(|ip| ip == "127.0.0.1"));

    // Shrinking the LAN set is still covered: subset reuse.
    let fourth = store.load_or_generate(&ips).unwrap();
    assert!(!fourth.regenerated, "a SAN superset must be reused");
    assert_eq!(fourth.fingerprint, third.fingerprint);
}

/// A fresh certificate is valid for at least 358 days.
#[test]
fn fresh_certificate_expiry_is_far_out() {
    let dir = tempfile::tempdir().unwrap();
    let store = CertStore::new(dir.path());

    let _ = store.load_or_generate(&[]).unwrap();
    let meta: CertMeta = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("cert-meta.json")).unwrap(),
    )
    .unwrap();

    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    let remaining_days = (meta.not_after_unix - now) / 86_400;
    assert!(
        remaining_days >= VALIDITY_DAYS - RENEWAL_MARGIN_DAYS,
        "expected ≥ 358 days of validity, got {remaining_days}"
    );
}

/// A certificate inside the renewal margin is replaced on startup.
#[test]
fn near_expiry_forces_regeneration() {
    let dir = tempfile::tempdir().unwrap();
    let store = CertStore::new(dir.path());

    let first = store.load_or_generate(&[]).unwrap();

    // Rewrite the sidecar to claim the pair expires in 3 days.
    let meta_path = dir.path().join("cert-meta.json");
    let mut meta: CertMeta =
        serde_json::from_str(&std::fs::read_to_string(&meta_path).unwrap()).unwrap();
    meta.not_after_unix = time::OffsetDateTime::now_utc().unix_timestamp() + 3 * 86_400;
    std::fs::write(&meta_path, serde_json::to_string(&meta).unwrap()).unwrap();

    let second = store.load_or_generate(&[]).unwrap();
    assert!(second.regenerated, "near-expiry pair must be replaced");
    assert_ne!(second.fingerprint, first.fingerprint);
}

/// Missing or corrupt files force regeneration rather than failing.
#[test]
fn corrupt_store_regenerates() {
    let dir = tempfile::tempdir().unwrap();
    let store = CertStore::new(dir.path());

    let _ = store.load_or_generate(&[]).unwrap();
    std::fs::write(dir.path().join("cert-meta.json"), "not json at all").unwrap();

    let recovered = store.load_or_generate(&[]).unwrap();
    assert!(recovered.regenerated, "corrupt metadata must regenerate");
}
