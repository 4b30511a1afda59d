use url::Url;

use super::LOCAL_HOST;

const FORMAT_NAME_PREFIX: &str = "FORMATNAME:";
const HTTP_QUEUE_PREFIX: &str = "/msmq";

/// How a native address reaches its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeScheme {
    /// `host\queue`, resolved through the directory.
    Path,
    /// `DIRECT=OS:`
    Os,
    /// `DIRECT=TCP:`
    Tcp,
    /// `DIRECT=HTTP://`
    Http,
    /// `DIRECT=HTTPS://`
    Https,
    /// `MULTICAST=`
    Multicast,
}

/// A parsed native address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatName {
    pub scheme: NativeScheme,
    pub host: String,
    /// Queue path with its leading separator, e.g. `\private$\orders`. Empty
    /// for multicast addresses.
    pub path: String,
    pub subqueue: Option<String>,
}

impl FormatName {
    /// Parses a native address. Returns `None` when the text is not a
    /// recognised format.
    pub fn parse(text: &str) -> Option<Self> {
        let text = strip_prefix_ignore_case(text, FORMAT_NAME_PREFIX).unwrap_or(text);

        let Some((address_scheme, rest)) = text.split_once('=') else {
            return Self::parse_os_or_tcp(text, NativeScheme::Path);
        };
        if address_scheme.eq_ignore_ascii_case("DIRECT") {
            Self::parse_direct(rest)
        } else if address_scheme.eq_ignore_ascii_case("MULTICAST") {
            if rest.is_empty() {
                return None;
            }
            Some(Self {
                scheme: NativeScheme::Multicast,
                host: rest.to_string(),
                path: String::new(),
                subqueue: None,
            })
        } else {
            None
        }
    }

    fn parse_direct(text: &str) -> Option<Self> {
        let (scheme, rest) = text.split_once(':')?;
        if scheme.eq_ignore_ascii_case("OS") {
            Self::parse_os_or_tcp(rest, NativeScheme::Os)
        } else if scheme.eq_ignore_ascii_case("TCP") {
            Self::parse_os_or_tcp(rest, NativeScheme::Tcp)
        } else if scheme.eq_ignore_ascii_case("HTTP") {
            Self::parse_http(rest, NativeScheme::Http)
        } else if scheme.eq_ignore_ascii_case("HTTPS") {
            Self::parse_http(rest, NativeScheme::Https)
        } else {
            None
        }
    }

    fn parse_os_or_tcp(text: &str, scheme: NativeScheme) -> Option<Self> {
        let backslash = text.find('\\')?;
        let host = &text[..backslash];
        if host.is_empty() {
            return None;
        }
        let (path, subqueue) = split_subqueue(&text[backslash..]);
        Some(Self {
            scheme,
            host: host.to_string(),
            path: path.to_string(),
            subqueue: subqueue.map(str::to_string),
        })
    }

    fn parse_http(text: &str, scheme: NativeScheme) -> Option<Self> {
        let text = text.strip_prefix("//")?;
        let slash = text.find('/')?;
        Some(Self {
            scheme,
            host: text[..slash].to_string(),
            path: text[slash..].to_string(),
            subqueue: None,
        })
    }

    /// Renders this address as a URI.
    ///
    /// `.` hosts become `machine_name`. A `DIRECT=OS` address bound to a
    /// multicast group is rendered as that group.
    pub fn to_uri(&self, machine_name: &str, multicast: Option<&str>) -> Option<Url> {
        let host = if self.host == LOCAL_HOST {
            machine_name
        } else {
            self.host.as_str()
        };
        let mut path = self.path.replace('\\', "/");

        let text = match (self.scheme, multicast) {
            (NativeScheme::Os, Some(group)) => format!("msmq+pgm://{group}{path}"),
            (NativeScheme::Path, _) => format!("msmq://{host}{path}"),
            (NativeScheme::Os, None) => format!("msmq+os://{host}{path}"),
            (NativeScheme::Tcp, _) => format!("msmq+tcp://{host}{path}"),
            (NativeScheme::Http | NativeScheme::Https, _) => {
                if let Some(stripped) = strip_prefix_ignore_case(&path, HTTP_QUEUE_PREFIX) {
                    path = stripped.to_string();
                }
                let scheme = if self.scheme == NativeScheme::Http {
                    "msmq+http"
                } else {
                    "msmq+https"
                };
                format!("{scheme}://{host}{path}")
            }
            (NativeScheme::Multicast, _) => format!("msmq+pgm://{host}"),
        };

        let mut uri = Url::parse(&text).ok()?;
        if let Some(sub) = &self.subqueue {
            uri.set_fragment(Some(sub));
        }
        Some(uri)
    }
}

/// Splits `path;subqueue` on the last `;`, ignoring a leading one.
fn split_subqueue(path: &str) -> (&str, Option<&str>) {
    match path.rfind(';') {
        Some(i) if i > 0 => (&path[..i], Some(&path[i + 1..])),
        _ => (path, None),
    }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &text[prefix.len()..])
}
