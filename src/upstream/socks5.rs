//! SOCKS5 client side: greeting, optional username/password, CONNECT.

use std::net::IpAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::net::Target;
use crate::upstream::DialError;

const VERSION: u8 = 5;
const AUTH_VERSION: u8 = 1;
const METHOD_NO_AUTH: u8 = 0;
const METHOD_USERNAME: u8 = 2;
const METHOD_NONE_ACCEPTABLE: u8 = 0xFF;
const CMD_CONNECT: u8 = 1;
const ATYP_IPV4: u8 = 1;
const ATYP_DOMAIN: u8 = 3;
const ATYP_IPV6: u8 = 4;

/// RFC 1929 credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    fn to_auth_buf(&self) -> Vec<u8> {
        let ulen = self.username.len();
        let plen = self.password.len();
        let mut buf = Vec::with_capacity(3 + ulen + plen);
        buf.push(AUTH_VERSION);
        buf.push(ulen as u8);
        buf.extend_from_slice(self.username.as_bytes());
        buf.push(plen as u8);
        buf.extend_from_slice(self.password.as_bytes());
        buf
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An upstream SOCKS5 proxy every tunnel is dialed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks5Upstream {
    pub server: Target,
    pub credentials: Option<Credentials>,
}

impl Socks5Upstream {
    pub fn new(server: Target, credentials: Option<Credentials>) -> Self {
        Self {
            server,
            credentials,
        }
    }

    fn greeting(&self) -> &'static [u8] {
        if self.credentials.is_some() {
            &[VERSION, 2, METHOD_NO_AUTH, METHOD_USERNAME]
        } else {
            &[VERSION, 1, METHOD_NO_AUTH]
        }
    }

    /// Run the client handshake on an already connected stream.
    pub async fn handshake<S>(&self, stream: &mut S, target: &Target) -> Result<(), DialError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        stream.write_all(self.greeting()).await?;

        let mut resp = [0u8; 2];
        stream.read_exact(&mut resp).await?;
        if resp[0] != VERSION {
            return Err(DialError::Protocol("invalid upstream SOCKS version"));
        }
        match resp[1] {
            METHOD_NO_AUTH => {}
            METHOD_USERNAME => {
                let credentials = self.credentials.as_ref().ok_or(DialError::AuthRequired)?;
                stream.write_all(&credentials.to_auth_buf()).await?;

                let mut auth_resp = [0u8; 2];
                stream.read_exact(&mut auth_resp).await?;
                if auth_resp[0] != AUTH_VERSION || auth_resp[1] != 0 {
                    return Err(DialError::AuthFailed);
                }
            }
            METHOD_NONE_ACCEPTABLE => return Err(DialError::NoAcceptableMethod),
            _ => return Err(DialError::Protocol("upstream chose an unoffered method")),
        }

        stream.write_all(&connect_request(target)).await?;

        let mut header = [0u8; 4];
        stream.read_exact(&mut header).await?;
        if header[0] != VERSION {
            return Err(DialError::Protocol("invalid upstream SOCKS version"));
        }
        if header[1] != 0 {
            return Err(DialError::Rejected(header[1]));
        }

        // Bound address and port; unused but must be consumed.
        let remaining = match header[3] {
            ATYP_IPV4 => 4 + 2,
            ATYP_IPV6 => 16 + 2,
            ATYP_DOMAIN => {
                let mut len = [0u8; 1];
                stream.read_exact(&mut len).await?;
                len[0] as usize + 2
            }
            _ => return Err(DialError::Protocol("upstream returned unsupported address type")),
        };
        let mut rest = vec![0u8; remaining];
        stream.read_exact(&mut rest).await?;

        Ok(())
    }
}

fn connect_request(target: &Target) -> Vec<u8> {
    let mut buf = Vec::with_capacity(6 + 1 + target.host.len().max(16));
    buf.extend_from_slice(&[VERSION, CMD_CONNECT, 0]);
    match target.ip() {
        Some(IpAddr::V4(ip)) => {
            buf.push(ATYP_IPV4);
            buf.extend_from_slice(&ip.octets());
        }
        Some(IpAddr::V6(ip)) => {
            buf.push(ATYP_IPV6);
            buf.extend_from_slice(&ip.octets());
        }
        None => {
            // Target::parse caps host names at 255 bytes.
            buf.push(ATYP_DOMAIN);
            buf.push(target.host.len() as u8);
            buf.extend_from_slice(target.host.as_bytes());
        }
    }
    buf.extend_from_slice(&target.port.to_be_bytes());
    buf
}

/// Human readable text for a CONNECT reply code.
pub fn reply_message(code: u8) -> &'static str {
    match code {
        1 => "general failure",
        2 => "connection not allowed by ruleset",
        3 => "network unreachable",
        4 => "host unreachable",
        5 => "connection refused",
        6 => "TTL expired",
        7 => "command not supported",
        8 => "address type not supported",
        _ => "unknown error",
    }
}
