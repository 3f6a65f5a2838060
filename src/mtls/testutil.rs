//! Certificate fixtures shared by unit and integration tests.

use std::path::{Path, PathBuf};

use pkcs8::pkcs5::pbes2;
use pkcs8::{LineEnding, PrivateKeyInfo};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, Issuer,
    KeyPair,
};
use time::{Duration, OffsetDateTime};

/// Self-signed leaf certificate with the given CN.
pub fn self_signed(cn: &str) -> (Certificate, KeyPair) {
    let key = KeyPair::generate().unwrap();
    let cert = leaf_params(cn, 365).self_signed(&key).unwrap();
    (cert, key)
}

/// A throwaway certificate authority.
pub struct TestCa {
    pub cert: Certificate,
    issuer: Issuer<'static, KeyPair>,
}

impl TestCa {
    pub fn new(cn: &str) -> Self {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, cn);
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.not_before = OffsetDateTime::now_utc() - Duration::days(1);
        params.not_after = OffsetDateTime::now_utc() + Duration::days(3650);
        let cert = params.self_signed(&key).unwrap();
        Self {
            cert,
            issuer: Issuer::new(params, key),
        }
    }

    /// Issue a leaf valid from yesterday for `valid_days` days.
    pub fn issue(&self, cn: &str, valid_days: i64) -> (Certificate, KeyPair) {
        let key = KeyPair::generate().unwrap();
        let cert = leaf_params(cn, valid_days)
            .signed_by(&key, &self.issuer)
            .unwrap();
        (cert, key)
    }
}

fn leaf_params(cn: &str, valid_days: i64) -> CertificateParams {
    let mut params = CertificateParams::new(vec![format!("{cn}.test")]).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    params.distinguished_name = dn;
    params.not_before = OffsetDateTime::now_utc() - Duration::days(1);
    params.not_after = OffsetDateTime::now_utc() + Duration::days(valid_days);
    params
}

/// PKCS#8 `ENCRYPTED PRIVATE KEY` PEM block for `key`.
pub fn encrypted_key_pem(key: &KeyPair, password: &str) -> String {
    let der = key.serialize_der();
    let info = PrivateKeyInfo::try_from(der.as_slice()).unwrap();
    let params =
        pbes2::Parameters::pbkdf2_sha256_aes256cbc(2048, b"fixture-salt", b"0123456789abcdef")
            .unwrap();
    let doc = info.encrypt_with_params(params, password).unwrap();
    doc.to_pem("ENCRYPTED PRIVATE KEY", LineEnding::LF)
        .unwrap()
        .to_string()
}

/// Write `trust.pem` and `server.pem` under `dir`.
pub fn write_stores(
    dir: &Path,
    trusted: &[&Certificate],
    server: &Certificate,
    key: &KeyPair,
    password: &str,
) -> (PathBuf, PathBuf) {
    let trust_path = dir.join("trust.pem");
    let trust: String = trusted.iter().map(|c| c.pem()).collect();
    std::fs::write(&trust_path, trust).unwrap();

    let key_path = dir.join("server.pem");
    let bundle = format!("{}{}", server.pem(), encrypted_key_pem(key, password));
    std::fs::write(&key_path, bundle).unwrap();

    (trust_path, key_path)
}
