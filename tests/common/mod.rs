pub mod test_server {
    use std::net::{SocketAddr, TcpListener};
    use std::sync::{Arc, Once, RwLock};
    use waymark::{HttpServer, Router, RouterConfig, RouterService, ServerHandle};

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_test_logging() {
        MAY_INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
                )
                .with_test_writer()
                .try_init();
        });
    }

    /// Start a router on an ephemeral port and wait until it accepts
    /// connections.
    pub fn start_router(router: Router, config: RouterConfig) -> (ServerHandle, SocketAddr) {
        setup_test_logging();
        let service = RouterService::new(Arc::new(RwLock::new(router)), config);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let handle = HttpServer::new(service).start(addr).unwrap();
        handle.wait_ready().unwrap();
        (handle, addr)
    }
}

pub mod http {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::Duration;

    /// Send a raw HTTP request and return the full raw response as bytes.
    /// Reads headers fully, honors Content-Length for the body, and falls
    /// back to read-until-timeout when no length is provided.
    pub fn send_request_bytes(addr: &SocketAddr, req: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(req).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();

        let mut buf = Vec::new();
        let mut header_end = None;
        for _ in 0..10 {
            let mut tmp = [0u8; 1024];
            match stream.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => {
                    buf.extend_from_slice(&tmp[..n]);
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        header_end = Some(pos + 4);
                        break;
                    }
                }
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    std::thread::sleep(Duration::from_millis(50));
                    continue;
                }
                Err(e) => panic!("read error: {:?}", e),
            }
        }

        let header_end = header_end.unwrap_or(buf.len());
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let content_length = headers
            .lines()
            .filter_map(|l| l.split_once(':'))
            .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.trim().parse::<usize>().ok());

        if let Some(clen) = content_length {
            let mut body_len = buf.len().saturating_sub(header_end);
            while body_len < clen {
                let mut tmp = [0u8; 4096];
                match stream.read(&mut tmp) {
                    Ok(0) => break,
                    Ok(n) => {
                        buf.extend_from_slice(&tmp[..n]);
                        body_len += n;
                    }
                    Err(ref e)
                        if e.kind() == std::io::ErrorKind::WouldBlock
                            || e.kind() == std::io::ErrorKind::TimedOut =>
                    {
                        std::thread::sleep(Duration::from_millis(50));
                        continue;
                    }
                    Err(e) => panic!("read error: {:?}", e),
                }
            }
        }

        buf
    }

    pub fn send_request(addr: &SocketAddr, req: &str) -> String {
        String::from_utf8_lossy(&send_request_bytes(addr, req.as_bytes())).to_string()
    }

    /// Split a raw response into status, headers, and body.
    pub struct RawResponse {
        pub status: u16,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    impl RawResponse {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }

        pub fn body_text(&self) -> String {
            String::from_utf8_lossy(&self.body).to_string()
        }

        pub fn body_json(&self) -> serde_json::Value {
            serde_json::from_slice(&self.body).unwrap_or_default()
        }
    }

    pub fn parse_response(raw: &[u8]) -> RawResponse {
        let header_end = raw
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .map(|p| p + 4)
            .unwrap_or(raw.len());
        let head = String::from_utf8_lossy(&raw[..header_end]);
        let mut lines = head.lines();
        let status = lines
            .next()
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let headers = lines
            .filter_map(|l| l.split_once(':'))
            .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
            .collect();
        RawResponse {
            status,
            headers,
            body: raw[header_end..].to_vec(),
        }
    }

    pub fn request(addr: &SocketAddr, req: &str) -> RawResponse {
        parse_response(&send_request_bytes(addr, req.as_bytes()))
    }

    pub fn request_bytes(addr: &SocketAddr, req: &[u8]) -> RawResponse {
        parse_response(&send_request_bytes(addr, req))
    }
}

pub mod temp_files {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

    /// Create a unique temporary directory for a test.
    pub fn create_temp_dir(label: &str) -> PathBuf {
        let counter = TEMP_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "waymark_test_{}_{}_{}",
            std::process::id(),
            label,
            counter
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
