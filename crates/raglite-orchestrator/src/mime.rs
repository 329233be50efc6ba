//! MIME detection: extension first, then magic-number sniffing.

use std::path::Path;

/// Detect a file's MIME type from its extension, falling back to content
/// sniffing for the binary container formats.
pub fn detect(path: &Path, header: &[u8]) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if let Some(mime) = by_extension(&ext) {
        return mime.to_string();
    }
    if let Some(mime) = by_magic(header, &ext) {
        return mime.to_string();
    }
    if header_is_text(header) {
        return "text/plain".to_string();
    }
    "application/octet-stream".to_string()
}

fn by_extension(ext: &str) -> Option<&'static str> {
    Some(match ext {
        "txt" | "text" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "go" => "text/x-go",
        "rs" => "text/x-rust",
        "py" => "text/x-python",
        "js" | "jsx" => "text/javascript",
        "ts" | "tsx" => "text/typescript",
        "sql" => "text/x-sql",
        "sh" | "bash" | "zsh" => "text/x-shellscript",
        "c" | "h" => "text/x-c",
        "java" => "text/x-java",
        "json" => "application/json",
        "yaml" | "yml" => "text/yaml",
        "toml" => "text/toml",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "xml" => "text/xml",
        "csv" => "text/csv",
        "pdf" => "application/pdf",
        "docx" => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        "doc" => "application/msword",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xls" => "application/vnd.ms-excel",
        _ => return None,
    })
}

/// PDF and ZIP-based Office containers by magic numbers.
fn by_magic(header: &[u8], ext: &str) -> Option<&'static str> {
    if header.len() >= 4 && &header[..4] == b"%PDF" {
        return Some("application/pdf");
    }
    if header.len() >= 2 && header[0] == 0x50 && header[1] == 0x4b {
        return Some(match ext {
            "docx" => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            _ => "application/zip",
        });
    }
    if header.starts_with(b"#!") {
        let first_line = header
            .split(|&b| b == b'\n')
            .next()
            .map(|l| String::from_utf8_lossy(l).into_owned())
            .unwrap_or_default();
        if first_line.contains("sh") {
            return Some("text/x-shellscript");
        }
    }
    None
}

fn header_is_text(header: &[u8]) -> bool {
    if header.is_empty() {
        return false;
    }
    let printable = header
        .iter()
        .filter(|&&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..0x7f).contains(&b))
        .count();
    printable * 100 / header.len() >= 90
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn extension_wins() {
        assert_eq!(detect(&PathBuf::from("a.go"), b""), "text/x-go");
        assert_eq!(detect(&PathBuf::from("README.md"), b""), "text/markdown");
        assert_eq!(detect(&PathBuf::from("q.SQL"), b""), "text/x-sql");
    }

    #[test]
    fn pdf_magic() {
        assert_eq!(
            detect(&PathBuf::from("mystery"), b"%PDF-1.7 rest"),
            "application/pdf"
        );
    }

    #[test]
    fn zip_magic_disambiguated_by_extension() {
        assert_eq!(
            detect(&PathBuf::from("report.bin"), &[0x50, 0x4b, 0x03, 0x04]),
            "application/zip"
        );
        // Unknown extension with PK header and docx extension is caught by
        // the extension table before sniffing even runs.
        assert_eq!(
            detect(&PathBuf::from("report.docx"), &[0x50, 0x4b, 0x03, 0x04]),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
    }

    #[test]
    fn shebang_is_shellscript() {
        assert_eq!(
            detect(&PathBuf::from("deploy"), b"#!/bin/bash\nset -e\n"),
            "text/x-shellscript"
        );
    }

    #[test]
    fn printable_content_is_plain_text() {
        assert_eq!(
            detect(&PathBuf::from("notes"), b"just some words\n"),
            "text/plain"
        );
    }

    #[test]
    fn binary_is_octet_stream() {
        let header: Vec<u8> = (0..64u8).map(|i| i.wrapping_mul(7)).collect();
        assert_eq!(
            detect(&PathBuf::from("blob.bin"), &header),
            "application/octet-stream"
        );
    }
}
