use std::{
    fs,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use clap::{Parser, ValueEnum};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rsa::{
    RsaPrivateKey,
    pkcs1::DecodeRsaPrivateKey,
    signature::{SignatureEncoding, Signer},
    traits::PublicKeyParts,
};
use sha2::{Digest, Sha256, Sha384};
use uuid::Uuid;

/// Generate a DPoP proof JWT (JWS compact serialization) for manual testing.
///
/// - Builds the header (typ=dpop+jwt, alg, jwk with the public half of the key)
/// - Builds the claims (htu, htm, iat, jti, ath when an access token is given)
/// - Signs "base64url(header).base64url(payload)"
/// - Outputs the proof, the key's JWK thumbprint (cnf.jkt) and ath
#[derive(Parser, Debug)]
#[command(name = "dpop-gen", version, about)]
struct Args {
    /// Signing algorithm; must match the key in --private-pem
    #[arg(long, value_enum, default_value_t = Alg::Es256)]
    alg: Alg,

    /// Client private key in PEM (PKCS#8, or PKCS#1 for RSA)
    #[arg(long, value_name = "FILE")]
    private_pem: PathBuf,

    /// HTTP method (htm) e.g. GET/POST
    #[arg(long, default_value = "GET")]
    method: String,

    /// Full request URL used as htu (e.g. http://localhost:3000/api/v1/whoami)
    #[arg(long)]
    url: String,

    /// Access token string. If provided, ath will be included in the proof.
    #[arg(long)]
    access_token: Option<String>,

    /// Override iat (unix seconds). Default: now.
    #[arg(long)]
    iat: Option<i64>,

    /// Override jti. Default: random UUID v4.
    #[arg(long)]
    jti: Option<String>,

    /// Override the header typ (negative testing)
    #[arg(long, default_value = "dpop+jwt")]
    typ: String,

    /// Print only the DPoP token (no extra lines)
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Alg {
    #[value(name = "ES256")]
    Es256,
    #[value(name = "RS256")]
    Rs256,
    #[value(name = "RS384")]
    Rs384,
}

impl Alg {
    fn as_str(self) -> &'static str {
        match self {
            Alg::Es256 => "ES256",
            Alg::Rs256 => "RS256",
            Alg::Rs384 => "RS384",
        }
    }
}

type BoxError = Box<dyn std::error::Error>;

/// Private key plus its public JWK and RFC 7638 canonical form.
enum ClientKey {
    Ec(p256::ecdsa::SigningKey),
    Rsa(RsaPrivateKey),
}

impl ClientKey {
    fn load(alg: Alg, pem: &str) -> Result<Self, BoxError> {
        match alg {
            Alg::Es256 => {
                use p256::pkcs8::DecodePrivateKey;
                let secret = p256::SecretKey::from_pkcs8_pem(pem)?;
                Ok(Self::Ec(p256::ecdsa::SigningKey::from(&secret)))
            }
            Alg::Rs256 | Alg::Rs384 => {
                use rsa::pkcs8::DecodePrivateKey;
                let key = RsaPrivateKey::from_pkcs8_pem(pem)
                    .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))?;
                Ok(Self::Rsa(key))
            }
        }
    }

    // (jwk, canonical thumbprint input); members in lexicographic order, no whitespace
    fn jwk(&self) -> Result<(serde_json::Value, String), BoxError> {
        match self {
            Self::Ec(key) => {
                let point = key.verifying_key().to_encoded_point(false);
                let x = point.x().ok_or("EC public key without x")?;
                let y = point.y().ok_or("EC public key without y")?;
                let (x, y) = (b64url_bytes(x), b64url_bytes(y));
                let canonical = format!(
                    "{{\"crv\":\"P-256\",\"kty\":\"EC\",\"x\":\"{}\",\"y\":\"{}\"}}",
                    x, y
                );
                let jwk = serde_json::json!({"kty": "EC", "crv": "P-256", "x": x, "y": y});
                Ok((jwk, canonical))
            }
            Self::Rsa(key) => {
                let public = key.to_public_key();
                let n = b64url_bytes(&public.n().to_bytes_be());
                let e = b64url_bytes(&public.e().to_bytes_be());
                let canonical = format!("{{\"e\":\"{}\",\"kty\":\"RSA\",\"n\":\"{}\"}}", e, n);
                let jwk = serde_json::json!({"kty": "RSA", "n": n, "e": e});
                Ok((jwk, canonical))
            }
        }
    }

    fn sign(&self, alg: Alg, input: &[u8]) -> Result<Vec<u8>, BoxError> {
        match (self, alg) {
            (Self::Ec(key), Alg::Es256) => {
                // JWS wants the fixed-size r || s form, not DER
                let sig: p256::ecdsa::Signature = key.sign(input);
                Ok(sig.to_bytes().to_vec())
            }
            (Self::Rsa(key), Alg::Rs256) => {
                let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(key.clone());
                Ok(signer.sign(input).to_vec())
            }
            (Self::Rsa(key), Alg::Rs384) => {
                let signer = rsa::pkcs1v15::SigningKey::<Sha384>::new(key.clone());
                Ok(signer.sign(input).to_vec())
            }
            _ => Err(format!("key does not fit {}", alg.as_str()).into()),
        }
    }
}

fn b64url_json(value: &serde_json::Value) -> Result<String, BoxError> {
    let s = serde_json::to_string(value)?;
    Ok(URL_SAFE_NO_PAD.encode(s.as_bytes()))
}

fn b64url_bytes(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

fn sha256_b64url(input: &[u8]) -> String {
    b64url_bytes(&Sha256::digest(input))
}

fn now_unix() -> Result<i64, BoxError> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64)
}

fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    let pem = fs::read_to_string(&args.private_pem)?;
    let key = ClientKey::load(args.alg, &pem)?;

    let (jwk, canonical) = key.jwk()?;
    let jkt = sha256_b64url(canonical.as_bytes());

    // ath = base64url(SHA-256(access_token)) if access token provided.
    let ath = args
        .access_token
        .as_deref()
        .map(|t| sha256_b64url(t.as_bytes()));

    let iat = match args.iat {
        Some(iat) => iat,
        None => now_unix()?,
    };
    let jti = args.jti.unwrap_or_else(|| Uuid::new_v4().to_string());

    let header = serde_json::json!({
        "typ": args.typ,
        "alg": args.alg.as_str(),
        "jwk": jwk,
    });

    let mut claims = serde_json::json!({
        "htu": args.url,
        "htm": args.method.to_uppercase(),
        "iat": iat,
        "jti": jti,
    });
    if let Some(ath) = ath.as_deref() {
        claims["ath"] = serde_json::Value::String(ath.to_string());
    }

    let signing_input = format!("{}.{}", b64url_json(&header)?, b64url_json(&claims)?);
    let signature = key.sign(args.alg, signing_input.as_bytes())?;
    let dpop = format!("{}.{}", signing_input, b64url_bytes(&signature));

    if args.quiet {
        println!("{}", dpop);
        return Ok(());
    }

    println!("DPoP: {}", dpop);
    println!("jkt (cnf.jkt): {}", jkt);
    println!("alg: {}", args.alg.as_str());
    println!("iat: {}", iat);
    println!("jti: {}", jti);
    match ath {
        Some(ath) => println!("ath: {}", ath),
        None => println!("ath: (none)"),
    }

    Ok(())
}
