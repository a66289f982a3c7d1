/// Writes the INI-style `credentials`/`config` files the AWS SDK and CLI
/// expect (spec.md §4.9, §6), each file holding exactly one `[profile]`
/// section named after the identity being authenticated. `config` only
/// ever gets a `region` under `[profile <name>]`.

use std::fs;
use std::io::Write;
use std::path::Path;

use stackcat_core::AwsCredentials;

use super::Result;

pub fn write_credentials_file(path: &Path, profile: &str, creds: &AwsCredentials) -> Result<()> {
    let mut body = String::new();
    body.push_str(&format!("[{}]\n", profile));
    body.push_str(&format!("aws_access_key_id = {}\n", creds.access_key_id));
    body.push_str(&format!("aws_secret_access_key = {}\n", creds.secret_access_key));
    if let Some(token) = &creds.session_token {
        body.push_str(&format!("aws_session_token = {}\n", token));
    }
    write_file_0600(path, &body)
}

pub fn write_config_file(path: &Path, profile: &str, creds: &AwsCredentials) -> Result<()> {
    let mut body = String::new();
    body.push_str(&format!("[profile {}]\n", profile));
    body.push_str(&format!("region = {}\n", creds.region));
    write_file_0600(path, &body)
}

fn write_file_0600(path: &Path, body: &str) -> Result<()> {
    let mut f = fs::File::create(path)?;
    f.write_all(body.as_bytes())?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
