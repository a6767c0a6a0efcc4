//! `llmgate keygen`: Generate a client API key.

use clap::ValueEnum;
use rand::Rng;

/// Random bytes in the tail of a `secure` key (64 hex characters).
const SECURE_RANDOM_BYTES: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum KeyFormat {
    /// `ak_<base36 timestamp>_<64 hex chars>`
    Secure,
    /// `length` random bytes as hex
    Simple,
}

pub fn run(format: KeyFormat, length: usize) -> Result<(), Box<dyn std::error::Error>> {
    if length == 0 {
        return Err("--length must be at least 1".into());
    }

    let key = generate(format, length, chrono::Utc::now().timestamp_millis());

    println!("Generated API key ({} characters):", key.len());
    println!();
    println!("   {key}");
    println!();
    println!("Export it for the gateway:");
    println!("   export API_SECRET_KEY={key}");
    println!();
    println!("Clients send it as: Authorization: Bearer {key}");
    Ok(())
}

/// Build a key of the given format stamped with `now_millis`.
pub fn generate(format: KeyFormat, length: usize, now_millis: i64) -> String {
    match format {
        KeyFormat::Secure => format!(
            "ak_{}_{}",
            to_base36(u64::try_from(now_millis).unwrap_or(0)),
            random_hex(SECURE_RANDOM_BYTES)
        ),
        KeyFormat::Simple => random_hex(length),
    }
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill(buf.as_mut_slice());
    buf.iter().map(|b| format!("{b:02x}")).collect()
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
