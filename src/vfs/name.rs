//! SMB file names and their resolution
//!
//! [`SmbFileName`] is the virtual name of one remote object, parsed from
//! `smb://[[domain;]user[:password]@]host[:port]/share[/path]`. Resolution
//! ([`SmbFileName::resolve`]) turns it into the pieces the protocol needs:
//! the share target and the `\`-separated in-share path. Resolution is pure
//! and never touches the network.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::fmt;
use zeroize::Zeroizing;

use crate::error::{VfsError, VfsResult};
use crate::protocols::smb::ShareTarget;

const SCHEME: &str = "smb://";

/// Characters SMB servers reject in path components
const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '\\'];

/// Escaped when a name is rendered back into URI form
const URI_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'%')
    .add(b'#')
    .add(b'?')
    .add(b'/')
    .add(b'@')
    .add(b':')
    .add(b';');

/// Decode `%XX` escapes; the result must be UTF-8
fn decode(part: &str) -> Result<String, String> {
    percent_decode_str(part)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| format!("{:?} does not decode to UTF-8", part))
}

fn encode(part: &str) -> String {
    utf8_percent_encode(part, URI_ESCAPES).to_string()
}

/// Credentials carried in the user-info part of a name
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EmbeddedCredentials {
    pub username: Option<String>,
    pub password: Option<Zeroizing<String>>,
    pub domain: Option<String>,
}

impl fmt::Debug for EmbeddedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("domain", &self.domain)
            .finish()
    }
}

impl EmbeddedCredentials {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none() && self.domain.is_none()
    }

    /// Split `[domain;]user[:password]`; the domain only ever comes from
    /// the part before the first `:`
    fn parse(user_info: &str) -> Result<Self, String> {
        let (user_part, password) = match user_info.split_once(':') {
            Some((user, pass)) => (user, Some(Zeroizing::new(decode(pass)?))),
            None => (user_info, None),
        };
        let (domain, username) = match user_part.split_once(';') {
            Some((domain, user)) => (Some(decode(domain)?), user),
            None => (None, user_part),
        };
        let username = decode(username)?;
        Ok(Self {
            username: (!username.is_empty()).then_some(username),
            password,
            domain: domain.filter(|d| !d.is_empty()),
        })
    }
}

/// Virtual name of a remote SMB object
#[derive(Clone, PartialEq, Eq)]
pub struct SmbFileName {
    host: String,
    port: Option<u16>,
    share: String,
    /// Absolute path inside the share, `/` for the root
    path: String,
    credentials: EmbeddedCredentials,
}

impl fmt::Debug for SmbFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SmbFileName").field(&self.to_uri()).finish()
    }
}

impl fmt::Display for SmbFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

/// Collapse empty segments into `/a/b` form
fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Decode each segment of a URI path; an escaped `/` is refused so the
/// decoded path keeps the segment boundaries of the URI
fn decode_path(path: &str) -> Result<String, String> {
    let mut segments = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let decoded = decode(segment)?;
        if decoded.contains('/') {
            return Err(format!("segment {:?} contains an escaped separator", segment));
        }
        segments.push(decoded);
    }
    Ok(format!("/{}", segments.join("/")))
}

impl SmbFileName {
    /// Build a name from its parts
    pub fn new(host: &str, port: Option<u16>, share: &str, path: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            share: share.to_string(),
            path: normalize_path(path),
            credentials: EmbeddedCredentials::default(),
        }
    }

    /// Attach credentials to the name
    pub fn with_credentials(mut self, credentials: EmbeddedCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Parse an `smb://` URI
    ///
    /// Splits the URI into its parts and decodes `%XX` escapes in the
    /// user-info, share and path. The in-share path is validated by
    /// [`SmbFileName::resolve`].
    pub fn parse(uri: &str) -> VfsResult<Self> {
        let malformed = |reason: &str| VfsError::path_resolution(uri, reason);

        let rest = match uri.get(..SCHEME.len()) {
            Some(scheme) if scheme.eq_ignore_ascii_case(SCHEME) => &uri[SCHEME.len()..],
            _ => return Err(malformed("expected an smb:// URI")),
        };

        let (authority, share_and_path) = rest.split_once('/').unwrap_or((rest, ""));
        let (user_info, host_port) = match authority.rsplit_once('@') {
            Some((user_info, host_port)) => (Some(user_info), host_port),
            None => (None, authority),
        };

        let (host, port) = split_host_port(host_port).map_err(|reason| malformed(&reason))?;
        if host.is_empty() {
            return Err(malformed("missing host"));
        }

        let (share, path) = share_and_path
            .split_once('/')
            .unwrap_or((share_and_path, ""));
        if share.is_empty() {
            return Err(malformed("missing share name"));
        }
        let share = decode(share).map_err(|reason| malformed(&reason))?;
        let path = decode_path(path).map_err(|reason| malformed(&reason))?;
        let credentials = match user_info {
            Some(user_info) => {
                EmbeddedCredentials::parse(user_info).map_err(|_| malformed("invalid user info"))?
            }
            None => EmbeddedCredentials::default(),
        };

        Ok(Self {
            host: host.to_string(),
            port,
            share,
            path,
            credentials,
        })
    }

    /// URI form with the password redacted
    pub fn to_uri(&self) -> String {
        let mut uri = String::from(SCHEME);
        let creds = &self.credentials;
        if !creds.is_empty() {
            if let Some(domain) = &creds.domain {
                uri.push_str(&encode(domain));
                uri.push(';');
            }
            uri.push_str(&encode(creds.username.as_deref().unwrap_or("")));
            if creds.password.is_some() {
                uri.push_str(":***");
            }
            uri.push('@');
        }
        if self.host.contains(':') {
            uri.push_str(&format!("[{}]", self.host));
        } else {
            uri.push_str(&self.host);
        }
        if let Some(port) = self.port {
            uri.push_str(&format!(":{}", port));
        }
        uri.push('/');
        uri.push_str(&encode(&self.share));
        for segment in self.path.split('/').filter(|s| !s.is_empty()) {
            uri.push('/');
            uri.push_str(&encode(segment));
        }
        uri
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn share(&self) -> &str {
        &self.share
    }

    /// Absolute path inside the share (`/` for the root)
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn credentials(&self) -> &EmbeddedCredentials {
        &self.credentials
    }

    pub fn is_root(&self) -> bool {
        self.path == "/"
    }

    /// Last path segment; empty for the share root
    pub fn base_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }

    /// Split into share target and `\`-separated in-share path
    pub fn resolve(&self, default_port: u16) -> VfsResult<ResolvedName> {
        let uri = self.to_uri();
        if self.host.is_empty() {
            return Err(VfsError::path_resolution(uri, "missing host"));
        }
        validate_component(&self.share)
            .map_err(|reason| VfsError::path_resolution(&uri, format!("share name {}", reason)))?;

        let mut segments = Vec::new();
        for segment in self.path.split('/').filter(|s| !s.is_empty()) {
            validate_component(segment).map_err(|reason| {
                VfsError::path_resolution(&uri, format!("segment {:?} {}", segment, reason))
            })?;
            segments.push(segment);
        }

        Ok(ResolvedName {
            target: ShareTarget::new(
                self.host.clone(),
                self.port.unwrap_or(default_port),
                self.share.clone(),
            ),
            path: segments.join("\\"),
            credentials: self.credentials.clone(),
        })
    }
}

fn split_host_port(host_port: &str) -> Result<(&str, Option<u16>), String> {
    // Bracketed IPv6 literal
    if let Some(stripped) = host_port.strip_prefix('[') {
        let (host, after) = stripped
            .split_once(']')
            .ok_or_else(|| "unterminated IPv6 literal".to_string())?;
        return match after.strip_prefix(':') {
            Some(port) => Ok((host, Some(parse_port(port)?))),
            None if after.is_empty() => Ok((host, None)),
            None => Err("unexpected characters after host".to_string()),
        };
    }

    match host_port.rsplit_once(':') {
        Some((host, port)) => Ok((host, Some(parse_port(port)?))),
        None => Ok((host_port, None)),
    }
}

fn parse_port(port: &str) -> Result<u16, String> {
    port.parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| format!("invalid port {:?}", port))
}

fn validate_component(component: &str) -> Result<(), String> {
    if component.is_empty() {
        return Err("is empty".to_string());
    }
    if component == "." || component == ".." {
        return Err("is a dot segment".to_string());
    }
    if let Some(c) = component
        .chars()
        .find(|c| RESERVED_CHARS.contains(c) || c.is_control())
    {
        return Err(format!("contains reserved character {:?}", c));
    }
    Ok(())
}

/// A name split into the parts the protocol needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedName {
    pub target: ShareTarget,
    /// In-share path, `\`-separated; empty for the share root
    pub path: String,
    pub credentials: EmbeddedCredentials,
}

impl ResolvedName {
    pub fn is_share_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Whether `other` lives on the same share of the same server
    pub fn same_share(&self, other: &ResolvedName) -> bool {
        self.target.host.eq_ignore_ascii_case(&other.target.host)
            && self.target.port == other.target.port
            && self.target.share.eq_ignore_ascii_case(&other.target.share)
    }
}
