//! Rewrites local image references in compiled HTML into `cid:` links and
//! collects the files that have to travel with the message as inline parts.
//!
//! Scanning is a lexical regex pass over the markup rather than a DOM walk.
//! It recognises `src=` and `background=` attributes, which are the two places
//! MJML output carries image paths.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::{Captures, Regex};
use sha2::{Digest, Sha256};

/// One file to attach inline, addressed by `content_id` from the HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineAttachment {
    pub content_id: String,
    pub path: PathBuf,
}

/// HTML with every local image rewritten, plus its attachments in
/// first-occurrence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinedDocument {
    pub html: String,
    pub attachments: Vec<InlineAttachment>,
}

fn image_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r#"(?i)\b(src|background)="#,
            r#"(?:"([^"']+?\.(?:jpe?g|png|gif|svg))"|'([^"']+?\.(?:jpe?g|png|gif|svg))')"#,
        ))
        .expect("image reference pattern is valid")
    })
}

/// Content identifier for a reference path: lowercase hex SHA-256 of the path
/// text exactly as written in the markup.
pub fn content_id(reference: &str) -> String {
    hex::encode(Sha256::digest(reference.as_bytes()))
}

fn is_external(reference: &str) -> bool {
    let lower = reference.to_ascii_lowercase();
    ["cid:", "data:", "http://", "https://", "//"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

/// Join `reference` onto `base_dir` the way a URL-ish relative path is meant:
/// leading slashes don't reset to the filesystem root and `.`/`..` are folded.
/// Nothing stops `..` from climbing out of `base_dir`.
fn resolve(base_dir: &Path, reference: &str) -> PathBuf {
    let mut resolved = base_dir.to_path_buf();
    for component in Path::new(reference).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::ParentDir => {
                resolved.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    resolved
}

/// Make `dir` absolute against the current working directory.
pub fn resolve_base_dir(dir: &Path) -> io::Result<PathBuf> {
    if dir.is_absolute() {
        Ok(dir.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(dir))
    }
}

/// Rewrite local image references in `document` to `cid:` URIs.
///
/// Each distinct reference path gets exactly one attachment, resolved against
/// `base_dir`. Repeated occurrences reuse the first identifier. The
/// filesystem is never touched, so missing files only surface at send time.
pub fn inline(document: &str, base_dir: &Path) -> InlinedDocument {
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut attachments = Vec::new();

    let html = image_pattern().replace_all(document, |caps: &Captures| {
        let attribute = &caps[1];
        let reference = match caps.get(2).or_else(|| caps.get(3)) {
            Some(value) => value.as_str(),
            None => return caps[0].to_string(),
        };

        if is_external(reference) {
            return caps[0].to_string();
        }

        let cid = seen
            .entry(reference.to_string())
            .or_insert_with(|| {
                let cid = content_id(reference);
                attachments.push(InlineAttachment {
                    content_id: cid.clone(),
                    path: resolve(base_dir, reference),
                });
                cid
            })
            .clone();

        format!("{}=\"cid:{}\"", attribute, cid)
    });

    InlinedDocument {
        html: html.into_owned(),
        attachments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_image() {
        let doc = inline(r#"<img src="logo.png">"#, Path::new("/tpl"));
        let cid = content_id("logo.png");

        assert_eq!(doc.html, format!(r#"<img src="cid:{}">"#, cid));
        assert_eq!(
            doc.attachments,
            vec![InlineAttachment {
                content_id: cid,
                path: PathBuf::from("/tpl/logo.png"),
            }]
        );
    }

    #[test]
    fn test_repeated_reference_is_attached_once() {
        let html = r#"<img src="pic.jpg"><p>x</p><img src='pic.jpg'><td background="pic.jpg">"#;
        let doc = inline(html, Path::new("/tpl"));
        let cid = content_id("pic.jpg");

        assert_eq!(doc.attachments.len(), 1);
        assert_eq!(doc.html.matches(&format!("cid:{}", cid)).count(), 3);
        assert_eq!(
            doc.html,
            format!(
                r#"<img src="cid:{0}"><p>x</p><img src="cid:{0}"><td background="cid:{0}">"#,
                cid
            )
        );
    }

    #[test]
    fn test_attachments_in_first_occurrence_order() {
        let html = r#"<img src="b.gif"><img src="a.svg"><img src="b.gif"><img src="c.jpeg">"#;
        let doc = inline(html, Path::new("/tpl"));
        let paths: Vec<_> = doc.attachments.iter().map(|a| a.path.clone()).collect();

        assert_eq!(
            paths,
            vec![
                PathBuf::from("/tpl/b.gif"),
                PathBuf::from("/tpl/a.svg"),
                PathBuf::from("/tpl/c.jpeg"),
            ]
        );
    }

    #[test]
    fn test_no_images_leaves_document_unchanged() {
        let html = r#"<a href="https://example.com">hi</a><img src="photo.webp">"#;
        let doc = inline(html, Path::new("/tpl"));

        assert_eq!(doc.html, html);
        assert!(doc.attachments.is_empty());
    }

    #[test]
    fn test_identifiers_do_not_depend_on_order() {
        let forward = inline(r#"<img src="a.png"><img src="b.png">"#, Path::new("/tpl"));
        let reverse = inline(r#"<img src="b.png"><img src="a.png">"#, Path::new("/tpl"));

        let map = |doc: &InlinedDocument| -> HashMap<PathBuf, String> {
            doc.attachments
                .iter()
                .map(|a| (a.path.clone(), a.content_id.clone()))
                .collect()
        };
        assert_eq!(map(&forward), map(&reverse));
    }

    #[test]
    fn test_inline_is_idempotent() {
        let first = inline(
            r#"<img src="images/header.PNG"><img src="images/footer.jpg">"#,
            Path::new("/tpl"),
        );
        let second = inline(&first.html, Path::new("/tpl"));

        assert_eq!(second.html, first.html);
        assert!(second.attachments.is_empty());
    }

    #[test]
    fn test_case_insensitive_extension() {
        let doc = inline(r#"<IMG SRC="Banner.JPG">"#, Path::new("/tpl"));

        assert_eq!(doc.attachments.len(), 1);
        assert_eq!(doc.attachments[0].path, PathBuf::from("/tpl/Banner.JPG"));
        assert_eq!(doc.html, format!(r#"<IMG SRC="cid:{}">"#, content_id("Banner.JPG")));
    }

    #[test]
    fn test_remote_and_embedded_images_are_skipped() {
        let html = concat!(
            r#"<img src="https://cdn.example.com/a.png">"#,
            r#"<img src="//cdn.example.com/b.png">"#,
            r#"<img src="data:image/png;base64,xyz.png">"#,
        );
        let doc = inline(html, Path::new("/tpl"));

        assert_eq!(doc.html, html);
        assert!(doc.attachments.is_empty());
    }

    #[test]
    fn test_mismatched_quotes_are_not_matched() {
        let html = concat!(
            r#"<img src="logo.png alt='x'><img src=logo.png>"#,
            r#"<img src="logo.png'><img src='banner.jpg">"#,
        );
        let doc = inline(html, Path::new("/tpl"));

        assert_eq!(doc.html, html);
        assert!(doc.attachments.is_empty());
    }

    #[test]
    fn test_reference_path_resolution() {
        let base = Path::new("/tpl");
        assert_eq!(resolve(base, "./img/a.png"), PathBuf::from("/tpl/img/a.png"));
        assert_eq!(resolve(base, "/img/a.png"), PathBuf::from("/tpl/img/a.png"));
        assert_eq!(resolve(base, "../shared/a.png"), PathBuf::from("/shared/a.png"));
    }

    #[test]
    fn test_distinct_spellings_get_distinct_identifiers() {
        // Paths are not normalized before hashing
        let doc = inline(r#"<img src="a.png"><img src="./a.png">"#, Path::new("/tpl"));

        assert_eq!(doc.attachments.len(), 2);
        assert_ne!(doc.attachments[0].content_id, doc.attachments[1].content_id);
        assert_eq!(doc.attachments[0].path, doc.attachments[1].path);
    }

    #[test]
    fn test_content_id_is_uri_safe() {
        let cid = content_id("images/logo.png");
        assert_eq!(cid.len(), 64);
        assert!(cid.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(cid, content_id("images/logo.png"));
    }

    #[test]
    fn test_resolve_base_dir() {
        let absolute = resolve_base_dir(Path::new("/tpl")).unwrap();
        assert_eq!(absolute, PathBuf::from("/tpl"));

        let relative = resolve_base_dir(Path::new("templates")).unwrap();
        assert!(relative.is_absolute());
        assert!(relative.ends_with("templates"));
    }
}
