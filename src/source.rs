// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Repository sources and their components.

A [Source] points at a repository origin and a distribution. It fetches the
distribution's signed `InRelease` manifest, requires a trusted signature,
and derives one [Component] per requested component and matching
architecture. Each component then fetches and decodes its `Packages` index,
verifying every byte against the digest recorded in the manifest.
*/

use {
    crate::{
        control::ControlParagraphAsyncReader,
        error::{Result, RootfsError},
        io::{read_decompressed, Compression, HashingReader},
        keyring::Keyring,
        package::Package,
        release::ReleaseFile,
    },
    chrono::{DateTime, TimeZone, Utc},
    futures::{AsyncRead, AsyncReadExt, TryStreamExt},
    mailparse::dateparse,
    reqwest::Client,
    std::collections::{HashMap, HashSet},
    tracing::{debug, warn},
    url::Url,
};

const DEFAULT_DISTRIBUTION: &str = "stable";

const DEFAULT_COMPONENTS: &[&str] = &["main"];

/// Index filename candidates, tried in order.
const INDEX_CANDIDATES: &[(&str, Compression)] = &[
    ("Packages.xz", Compression::Xz),
    ("Packages.gz", Compression::Gzip),
    ("Packages", Compression::None),
];

/// Recipe-derived description of a repository source.
#[derive(Clone, Debug, Default)]
pub struct SourceConfig {
    /// Repository origin URL, e.g. `http://deb.debian.org/debian`.
    pub url: String,
    /// Trust anchor location: a local file path or HTTPS URL of armored
    /// OpenPGP key material. Empty means no trust anchor, under which no
    /// release will verify.
    pub signed_by: String,
    /// Distribution name, defaulting to `stable`.
    pub distribution: Option<String>,
    /// Component names, defaulting to `main`.
    pub components: Vec<String>,
}

/// A repository source bound to one distribution.
pub struct Source {
    client: Client,
    keyring: Keyring,
    source_url: Url,
    distribution: String,
    components: Vec<String>,
}

impl Source {
    /// Construct a source, loading its trust anchor.
    pub async fn new(client: Client, config: SourceConfig) -> Result<Self> {
        let distribution = config
            .distribution
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| DEFAULT_DISTRIBUTION.to_string());

        let components = if config.components.is_empty() {
            DEFAULT_COMPONENTS.iter().map(|c| c.to_string()).collect()
        } else {
            config.components
        };

        let mut source_url = Url::parse(&config.url)?;

        // Trailing slashes are significant to Url::join.
        if !source_url.path().ends_with('/') {
            source_url.set_path(&format!("{}/", source_url.path()));
        }

        let keyring = Keyring::load(&client, &config.signed_by).await?;

        Ok(Self {
            client,
            keyring,
            source_url,
            distribution,
            components,
        })
    }

    /// Fetch the signed release manifest and derive the components
    /// available for the target architecture.
    ///
    /// Produces an empty list, with a warning, when the release offers no
    /// matching architecture or component.
    pub async fn components(&self, target_arch: &str) -> Result<Vec<Component>> {
        let release_url = self
            .source_url
            .join(&format!("dists/{}/InRelease", self.distribution))?;

        debug!(url = %release_url, "fetching release manifest");

        let response = self
            .client
            .get(release_url.clone())
            .send()
            .await
            .map_err(|e| RootfsError::from_fetch(release_url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RootfsError::HttpStatus {
                status: status.as_u16(),
                url: release_url.to_string(),
            });
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| RootfsError::from_fetch(release_url.as_str(), e))?;

        let release = ReleaseFile::from_armored_reader(std::io::Cursor::new(data))?;
        release.require_signed_by(&self.keyring)?;

        self.components_from_release(&release, target_arch)
    }

    fn components_from_release(
        &self,
        release: &ReleaseFile,
        target_arch: &str,
    ) -> Result<Vec<Component>> {
        let available_architectures = release
            .architectures()
            .into_iter()
            .filter(|arch| *arch == "all" || *arch == target_arch)
            .map(ToString::to_string)
            .collect::<Vec<_>>();

        if available_architectures.is_empty() {
            warn!("no architectures available");
            return Ok(vec![]);
        }

        let mut desired = DEFAULT_COMPONENTS
            .iter()
            .map(|c| c.to_string())
            .collect::<HashSet<_>>();
        desired.extend(self.components.iter().cloned());

        let available_components = release
            .components()
            .into_iter()
            .filter(|component| desired.contains(*component))
            .map(ToString::to_string)
            .collect::<Vec<_>>();

        if available_components.is_empty() {
            warn!("no components available");
            return Ok(vec![]);
        }

        let manifest = release.sha256_entries()?;

        let mut components = vec![];
        for component in &available_components {
            for arch in &available_architectures {
                let component_url = self.source_url.join(&format!(
                    "dists/{}/{}/binary-{}/",
                    self.distribution, component, arch
                ))?;

                // Manifest paths are relative to the distribution directory
                // and use the final path segment of slash-carrying
                // component names.
                let base = component.rsplit('/').next().expect("split is non-empty");
                let component_dir = format!("{}/binary-{}/", base, arch);

                let sha256_sums = manifest
                    .iter()
                    .filter_map(|entry| {
                        entry
                            .path
                            .strip_prefix(&component_dir)
                            .map(|name| (name.to_string(), entry.digest.clone()))
                    })
                    .collect::<HashMap<_, _>>();

                components.push(Component {
                    name: component.clone(),
                    architecture: arch.clone(),
                    url: component_url,
                    sha256_sums,
                    source_url: self.source_url.clone(),
                    client: self.client.clone(),
                });
            }
        }

        Ok(components)
    }
}

/// One component of a distribution for a single architecture.
pub struct Component {
    /// Component name, e.g. `main`.
    pub name: String,
    /// Architecture this component instance serves.
    pub architecture: String,
    /// Base URL of the `binary-{arch}` directory.
    pub url: Url,
    /// Expected SHA-256 digests of index files, keyed by filename.
    pub sha256_sums: HashMap<String, String>,
    source_url: Url,
    client: Client,
}

impl Component {
    /// Fetch and decode the package index for this component.
    ///
    /// Candidate filenames are tried in order of preference; the errors of
    /// failed candidates accumulate and surface only if every candidate
    /// fails. Also returns the server's `Last-Modified` timestamp when one
    /// was sent and parsed.
    pub async fn packages(&self) -> Result<(Vec<Package>, Option<DateTime<Utc>>)> {
        let mut errors = vec![];

        for (name, compression) in INDEX_CANDIDATES {
            match self.fetch_package_index(name, *compression).await {
                Ok(res) => return Ok(res),
                Err(e) => {
                    warn!(
                        component = %self.name,
                        index = name,
                        error = %e,
                        "package index candidate failed"
                    );
                    errors.push(e);
                }
            }
        }

        Err(RootfsError::Aggregate(errors))
    }

    async fn fetch_package_index(
        &self,
        name: &str,
        compression: Compression,
    ) -> Result<(Vec<Package>, Option<DateTime<Utc>>)> {
        let url = self.url.join(name)?;

        debug!(url = %url, "attempting to download package index");

        let expected_digest = self
            .sha256_sums
            .get(name)
            .ok_or_else(|| RootfsError::MissingIndexDigest(name.to_string()))?;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| RootfsError::from_fetch(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RootfsError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let last_modified = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| match dateparse(value) {
                Ok(seconds) => Utc.timestamp_opt(seconds, 0).single(),
                Err(e) => {
                    warn!(url = %url, error = %e, "failed to parse Last-Modified header");
                    None
                }
            });

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
            .into_async_read();

        let packages = decode_index(
            stream,
            compression,
            url.as_str(),
            expected_digest,
            &self.source_url,
        )
        .await?;

        Ok((packages, last_modified))
    }
}

/// Digest, verify, decompress, and decode a package index.
///
/// The digest covers the raw (compressed) bytes and is checked before any
/// decoded content is acted upon.
async fn decode_index(
    reader: impl AsyncRead + Send + Unpin,
    compression: Compression,
    name: &str,
    expected_digest: &str,
    source_url: &Url,
) -> Result<Vec<Package>> {
    let mut hashing = HashingReader::new(reader);

    let mut raw = vec![];
    hashing
        .read_to_end(&mut raw)
        .await
        .map_err(|e| RootfsError::IoPath(name.to_string(), e))?;

    hashing.verify(name, expected_digest)?;

    let mut reader = ControlParagraphAsyncReader::new(futures::io::BufReader::new(
        read_decompressed(
            futures::io::BufReader::new(futures::io::Cursor::new(raw)),
            compression,
        ),
    ));

    let mut packages = vec![];
    while let Some(paragraph) = reader.read_paragraph().await? {
        packages.push(Package::from_paragraph(&paragraph)?);
    }

    for pkg in &mut packages {
        if !pkg.filename.is_empty() {
            pkg.urls.push(source_url.join(&pkg.filename)?.to_string());
        }
    }

    Ok(packages)
}

#[cfg(test)]
mod test {
    use {
        super::*,
        indoc::indoc,
        sha2::{Digest, Sha256},
        std::io::Cursor,
        tokio::{io::AsyncWriteExt, net::TcpListener},
    };

    const RELEASE_BODY: &str = indoc! {"
        Origin: Example
        Suite: stable
        Codename: bookworm
        Architectures: all amd64 arm64
        Components: main contrib non-free
        SHA256:
         1111111111111111111111111111111111111111111111111111111111111111 100 main/binary-amd64/Packages
         2222222222222222222222222222222222222222222222222222222222222222 80 main/binary-amd64/Packages.gz
         3333333333333333333333333333333333333333333333333333333333333333 90 main/binary-all/Packages
         4444444444444444444444444444444444444444444444444444444444444444 70 contrib/binary-amd64/Packages
    "};

    const INDEX_BODY: &str = indoc! {"
        Package: hello
        Version: 2.10-3
        Architecture: amd64
        Filename: pool/main/h/hello/hello_2.10-3_amd64.deb

        Package: world
        Version: 1.0
        Architecture: amd64
        Filename: pool/main/w/world/world_1.0_amd64.deb
    "};

    fn test_source(components: &[&str]) -> Source {
        Source {
            client: Client::new(),
            keyring: Keyring::empty(),
            source_url: Url::parse("http://deb.example.com/debian/").unwrap(),
            distribution: "bookworm".to_string(),
            components: components.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn sha256_hex(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    #[test]
    fn components_for_target_arch() -> Result<()> {
        let release = ReleaseFile::from_reader(Cursor::new(RELEASE_BODY.as_bytes()))?;

        let source = test_source(&["main", "contrib"]);
        let components = source.components_from_release(&release, "amd64")?;

        // main and contrib, each for all + amd64.
        assert_eq!(components.len(), 4);

        let main_amd64 = components
            .iter()
            .find(|c| c.name == "main" && c.architecture == "amd64")
            .unwrap();

        assert_eq!(
            main_amd64.url.as_str(),
            "http://deb.example.com/debian/dists/bookworm/main/binary-amd64/"
        );
        assert_eq!(main_amd64.sha256_sums.len(), 2);
        assert_eq!(
            main_amd64.sha256_sums.get("Packages").unwrap(),
            "1111111111111111111111111111111111111111111111111111111111111111"
        );

        let main_all = components
            .iter()
            .find(|c| c.name == "main" && c.architecture == "all")
            .unwrap();
        assert_eq!(main_all.sha256_sums.len(), 1);

        Ok(())
    }

    #[test]
    fn unmatched_architecture_yields_no_components() -> Result<()> {
        let body = "Architectures: riscv64\nComponents: main\n";
        let release = ReleaseFile::from_reader(Cursor::new(body.as_bytes()))?;

        let source = test_source(&["main"]);
        assert!(source.components_from_release(&release, "amd64")?.is_empty());

        Ok(())
    }

    #[test]
    fn unmatched_component_yields_no_components() -> Result<()> {
        let body = "Architectures: amd64\nComponents: weird\n";
        let release = ReleaseFile::from_reader(Cursor::new(body.as_bytes()))?;

        let source = test_source(&["main"]);
        assert!(source.components_from_release(&release, "amd64")?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn decode_uncompressed_index() -> Result<()> {
        let source_url = Url::parse("http://deb.example.com/debian/").unwrap();

        let packages = decode_index(
            futures::io::Cursor::new(INDEX_BODY.as_bytes()),
            Compression::None,
            "Packages",
            &sha256_hex(INDEX_BODY.as_bytes()),
            &source_url,
        )
        .await?;

        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "hello");
        assert_eq!(
            packages[0].urls,
            vec!["http://deb.example.com/debian/pool/main/h/hello/hello_2.10-3_amd64.deb"]
        );

        Ok(())
    }

    #[tokio::test]
    async fn decode_rejects_corrupt_index() {
        let source_url = Url::parse("http://deb.example.com/debian/").unwrap();

        let res = decode_index(
            futures::io::Cursor::new(INDEX_BODY.as_bytes()),
            Compression::None,
            "Packages",
            &"00".repeat(32),
            &source_url,
        )
        .await;

        assert!(matches!(res, Err(RootfsError::HashMismatch { .. })));
    }

    #[tokio::test]
    async fn decode_gzip_index() -> Result<()> {
        use async_compression::futures::bufread::GzipEncoder;

        let mut encoder = GzipEncoder::new(futures::io::Cursor::new(INDEX_BODY.as_bytes()));
        let mut compressed = vec![];
        encoder.read_to_end(&mut compressed).await?;

        let source_url = Url::parse("http://deb.example.com/debian/").unwrap();
        let digest = sha256_hex(&compressed);

        let packages = decode_index(
            futures::io::Cursor::new(compressed),
            Compression::Gzip,
            "Packages.gz",
            &digest,
            &source_url,
        )
        .await?;

        assert_eq!(packages.len(), 2);

        Ok(())
    }

    /// Serve canned HTTP responses for one connection at a time.
    async fn serve_fixture(listener: TcpListener, responses: Vec<(&'static str, String)>) {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };

            let mut buf = [0u8; 4096];
            let n = match tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await {
                Ok(n) => n,
                Err(_) => continue,
            };
            let request = String::from_utf8_lossy(&buf[..n]).to_string();

            let response = responses
                .iter()
                .find(|(path, _)| request.starts_with(&format!("GET {} ", path)))
                .map(|(_, response)| response.clone())
                .unwrap_or_else(|| {
                    "HTTP/1.1 404 Not Found\r\nconnection: close\r\ncontent-length: 0\r\n\r\n"
                        .to_string()
                });

            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    }

    fn http_ok(body: &str, extra_headers: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nconnection: close\r\ncontent-length: {}\r\n{}\r\n{}",
            body.len(),
            extra_headers,
            body
        )
    }

    #[tokio::test]
    async fn index_fallback_after_digest_mismatch() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        // Packages.xz is missing, Packages.gz is corrupt (plain text body
        // does not match its recorded digest anyway), Packages is good.
        let responses = vec![
            (
                "/debian/dists/bookworm/main/binary-amd64/Packages.gz",
                http_ok("corrupt", ""),
            ),
            (
                "/debian/dists/bookworm/main/binary-amd64/Packages",
                http_ok(
                    INDEX_BODY,
                    "last-modified: Sat, 10 Feb 2024 10:06:25 GMT\r\n",
                ),
            ),
        ];

        tokio::spawn(serve_fixture(listener, responses));

        let source_url = Url::parse(&format!("http://{}/debian/", addr)).unwrap();

        let component = Component {
            name: "main".to_string(),
            architecture: "amd64".to_string(),
            url: source_url.join("dists/bookworm/main/binary-amd64/").unwrap(),
            sha256_sums: HashMap::from([
                ("Packages.xz".to_string(), "11".repeat(32)),
                ("Packages.gz".to_string(), "22".repeat(32)),
                ("Packages".to_string(), sha256_hex(INDEX_BODY.as_bytes())),
            ]),
            source_url,
            client: Client::new(),
        };

        let (packages, last_modified) = component.packages().await?;

        assert_eq!(packages.len(), 2);
        assert_eq!(packages[1].name, "world");
        assert!(last_modified.is_some());

        Ok(())
    }

    #[tokio::test]
    async fn all_candidates_failing_aggregates_errors() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        tokio::spawn(serve_fixture(listener, vec![]));

        let source_url = Url::parse(&format!("http://{}/debian/", addr)).unwrap();

        let component = Component {
            name: "main".to_string(),
            architecture: "amd64".to_string(),
            url: source_url.join("dists/bookworm/main/binary-amd64/").unwrap(),
            sha256_sums: HashMap::from([
                ("Packages.xz".to_string(), "11".repeat(32)),
                ("Packages.gz".to_string(), "22".repeat(32)),
                ("Packages".to_string(), "33".repeat(32)),
            ]),
            source_url,
            client: Client::new(),
        };

        match component.packages().await {
            Err(RootfsError::Aggregate(errors)) => {
                assert_eq!(errors.len(), 3);
                assert!(errors
                    .iter()
                    .all(|e| matches!(e, RootfsError::HttpStatus { status: 404, .. })));
            }
            other => panic!("expected aggregate error, got {:?}", other.map(|_| ())),
        }

        Ok(())
    }
}
