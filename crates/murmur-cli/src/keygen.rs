use crate::events::{emit, now_iso, EventKeygen};
use murmur_base::Cert;
use std::path::Path;

pub fn run(out: &Path, meta: Vec<(String, String)>) -> anyhow::Result<()> {
    let mut cert = Cert::new();
    for (name, value) in meta {
        cert.set_meta(name, value);
    }
    cert.save(out)?;

    eprintln!("Saved certificate to {}", out.display());
    emit(&EventKeygen {
        event: "keygen",
        public_key: cert.public_txt(),
        path: out.display().to_string(),
        timestamp: now_iso(),
    });
    Ok(())
}
