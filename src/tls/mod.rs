//! Self-signed TLS certificate cache for the HTTPS listener.
//!
//! The certificate lives at `~/.acp-proxy/{key.pem, cert.pem}` with a
//! `cert-meta.json` sidecar recording the expiry and the SAN IP list at
//! generation time. On startup the store reuses the cached pair when it is
//! still valid for more than [`RENEWAL_MARGIN_DAYS`] days **and** every
//! current non-loopback LAN IPv4 address appears in the recorded SAN list;
//! otherwise it generates a fresh 2048-bit RSA self-signed certificate
//! covering `localhost`, both loopbacks, and every discovered LAN IPv4.
//!
//! Files are persisted atomically (temp file + rename) so a crash mid-write
//! can only ever leave the previous pair behind, never a torn one.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};

use rcgen::{
    Certificate, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
    SanType, PKCS_RSA_SHA256,
};
use rsa::pkcs8::EncodePrivateKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::{AppError, Result};

/// Days of remaining validity below which the certificate is regenerated.
pub const RENEWAL_MARGIN_DAYS: i64 = 7;

/// Validity period of a freshly generated certificate.
pub const VALIDITY_DAYS: i64 = 365;

/// Subject common name.
pub const COMMON_NAME: &str = "ACP Proxy Server";

/// RSA key size in bits.
const RSA_BITS: usize = 2048;

/// Generation-time metadata persisted next to the PEM pair.
///
/// Recording expiry and SANs here avoids re-parsing X.509 on startup; any
/// inconsistency simply forces regeneration, which is always safe for a
/// self-signed certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertMeta {
    /// `notAfter` as seconds since the Unix epoch.
    pub not_after_unix: i64,
    /// SAN IP entries, rendered with `Display`.
    pub san_ips: Vec<String>,
}

/// Loaded or freshly generated TLS material.
#[derive(Debug, Clone)]
pub struct TlsMaterial {
    /// Certificate PEM.
    pub cert_pem: String,
    /// Private key PEM.
    pub key_pem: String,
    /// SHA-256 fingerprint of the certificate PEM, lowercase hex.
    pub fingerprint: String,
    /// Whether a new certificate was generated on this load.
    pub regenerated: bool,
}

/// On-disk certificate store rooted at a directory.
#[derive(Debug, Clone)]
pub struct CertStore {
    dir: PathBuf,
}

impl CertStore {
    /// Create a store rooted at `dir` (typically `~/.acp-proxy`).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn key_path(&self) -> PathBuf {
        self.dir.join("key.pem")
    }

    fn cert_path(&self) -> PathBuf {
        self.dir.join("cert.pem")
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join("cert-meta.json")
    }

    /// Load the cached certificate when the reuse conditions hold, else
    /// generate and persist a fresh one.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Tls`] when generation or persistence fails.
    pub fn load_or_generate(&self, lan_ips: &[Ipv4Addr]) -> Result<TlsMaterial> {
        if let Some(material) = self.try_reuse(lan_ips) {
            info!(fingerprint = %material.fingerprint, "reusing cached TLS certificate");
            return Ok(material);
        }
        let material = self.generate(lan_ips)?;
        info!(
            fingerprint = %material.fingerprint,
            san_ips = lan_ips.len(),
            "generated new TLS certificate"
        );
        Ok(material)
    }

    /// Reuse check: all three files parse, expiry is far enough out, and
    /// the current LAN set is a subset of the recorded SANs.
    fn try_reuse(&self, lan_ips: &[Ipv4Addr]) -> Option<TlsMaterial> {
        let key_pem = std::fs::read_to_string(self.key_path()).ok()?;
        let cert_pem = std::fs::read_to_string(self.cert_path()).ok()?;
        let meta: CertMeta =
            serde_json::from_str(&std::fs::read_to_string(self.meta_path()).ok()?).ok()?;

        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let remaining = meta.not_after_unix - now;
        if remaining <= RENEWAL_MARGIN_DAYS * 24 * 3600 {
            info!(remaining_secs = remaining, "cached certificate near expiry");
            return None;
        }

        let covered = lan_ips
            .iter()
            .all(|ip| meta.san_ips.iter().any(|san| san == &ip.to_string()));
        if !covered {
            info!("LAN address set changed since certificate generation");
            return None;
        }

        Some(TlsMaterial {
            fingerprint: fingerprint(&cert_pem),
            cert_pem,
            key_pem,
            regenerated: false,
        })
    }

    /// Generate a 2048-bit RSA self-signed certificate and persist it.
    fn generate(&self, lan_ips: &[Ipv4Addr]) -> Result<TlsMaterial> {
        let rsa_key = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), RSA_BITS)
            .map_err(|err| AppError::Tls(format!("RSA key generation failed: {err}")))?;
        let pkcs8 = rsa_key
            .to_pkcs8_der()
            .map_err(|err| AppError::Tls(format!("PKCS#8 encoding failed: {err}")))?;
        let key_pair = KeyPair::try_from(pkcs8.as_bytes())
            .map_err(|err| AppError::Tls(format!("key pair import failed: {err}")))?;

        let san_ips: Vec<IpAddr> = std::iter::once(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .chain(std::iter::once(IpAddr::V6(Ipv6Addr::LOCALHOST)))
            .chain(lan_ips.iter().map(|ip| IpAddr::V4(*ip)))
            .collect();

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, COMMON_NAME);

        let not_before = time::OffsetDateTime::now_utc();
        let not_after = not_before + time::Duration::days(VALIDITY_DAYS);

        let mut params = CertificateParams::default();
        params.alg = &PKCS_RSA_SHA256;
        params.key_pair = Some(key_pair);
        params.distinguished_name = dn;
        params.not_before = not_before;
        params.not_after = not_after;
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        params.subject_alt_names = std::iter::once(SanType::DnsName("localhost".to_owned()))
            .chain(san_ips.iter().map(|ip| SanType::IpAddress(*ip)))
            .collect();

        let cert = Certificate::from_params(params)
            .map_err(|err| AppError::Tls(format!("certificate build failed: {err}")))?;
        let cert_pem = cert
            .serialize_pem()
            .map_err(|err| AppError::Tls(format!("certificate serialization failed: {err}")))?;
        let key_pem = cert.serialize_private_key_pem();

        let meta = CertMeta {
            not_after_unix: not_after.unix_timestamp(),
            san_ips: san_ips.iter().map(ToString::to_string).collect(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|err| AppError::Tls(format!("metadata serialization failed: {err}")))?;

        std::fs::create_dir_all(&self.dir)
            .map_err(|err| AppError::Tls(format!("cannot create cert dir: {err}")))?;
        write_atomic(&self.key_path(), key_pem.as_bytes(), true)?;
        write_atomic(&self.cert_path(), cert_pem.as_bytes(), false)?;
        write_atomic(&self.meta_path(), meta_json.as_bytes(), false)?;

        Ok(TlsMaterial {
            fingerprint: fingerprint(&cert_pem),
            cert_pem,
            key_pem,
            regenerated: true,
        })
    }
}

/// SHA-256 of the PEM bytes, lowercase hex.
#[must_use]
pub fn fingerprint(cert_pem: &str) -> String {
    let digest = Sha256::digest(cert_pem.as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

/// Write `bytes` to `path` atomically via a sibling temp file.
fn write_atomic(path: &Path, bytes: &[u8], restrict: bool) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)
        .map_err(|err| AppError::Tls(format!("write '{}' failed: {err}", tmp.display())))?;

    #[cfg(unix)]
    if restrict {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        if let Err(err) = std::fs::set_permissions(&tmp, perms) {
            warn!(%err, "failed to restrict key permissions");
        }
    }
    #[cfg(not(unix))]
    let _ = restrict;

    std::fs::rename(&tmp, path)
        .map_err(|err| AppError::Tls(format!("rename '{}' failed: {err}", path.display())))
}

/// Discover non-loopback LAN IPv4 addresses.
///
/// Uses `getifaddrs` on Unix; elsewhere falls back to the local address of
/// an unconnected UDP socket pointed at a documentation address (nothing is
/// sent).
#[must_use]
pub fn lan_ipv4_addrs() -> Vec<Ipv4Addr> {
    let mut addrs = discover();
    addrs.retain(|ip| !ip.is_loopback() && !ip.is_link_local() && !ip.is_unspecified());
    addrs.sort_unstable();
    addrs.dedup();
    addrs
}

#[cfg(unix)]
fn discover() -> Vec<Ipv4Addr> {
    let Ok(ifaddrs) = nix::ifaddrs::getifaddrs() else {
        return Vec::new();
    };
    ifaddrs
        .filter_map(|ifa| ifa.address)
        .filter_map(|addr| addr.as_sockaddr_in().map(nix::sys::socket::SockaddrIn::ip))
        .collect()
}

#[cfg(not(unix))]
fn discover() -> Vec<Ipv4Addr> {
    let Ok(socket) = std::net::UdpSocket::bind(("0.0.0.0", 0)) else {
        return Vec::new();
    };
    if socket.connect(("192.0.2.1", 9)).is_err() {
        return Vec::new();
    }
    match socket.local_addr() {
        Ok(std::net::SocketAddr::V4(v4)) => vec![*v4.ip()],
        _ => Vec::new(),
    }
}
