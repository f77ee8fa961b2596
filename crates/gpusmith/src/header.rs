//! Launch header: the `//` comment on the first line of a generated kernel
//! that tells the launcher how to run it.

use crate::params::KernelFeatures;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchHeader {
    pub local: Vec<usize>,
    pub global: Vec<usize>,
    pub features: KernelFeatures,
}

impl LaunchHeader {
    /// `// -l 32 -g 1024 --atomics 4 ---inter_thread_comm`
    #[must_use]
    pub fn to_line(&self) -> String {
        let mut line = format!("// -l {} -g {}", join(&self.local), join(&self.global));
        if let Some(atomics) = self.features.atomics {
            line.push_str(&format!(" --atomics {atomics}"));
        }
        let flags = [
            (self.features.atomic_reductions, "---atomic_reductions"),
            (self.features.emi, "---emi"),
            (self.features.fake_divergence, "---fake_divergence"),
            (self.features.inter_thread_comm, "---inter_thread_comm"),
        ];
        for (on, flag) in flags {
            if on {
                line.push(' ');
                line.push_str(flag);
            }
        }
        line
    }
}

fn join(sizes: &[usize]) -> String {
    sizes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Launcher tokens carried by a header line.
///
/// Returns nothing unless the line is a `//` comment. `---flag` tokens
/// stand alone; any other `-opt` token takes the following token as its
/// value; everything else is skipped.
#[must_use]
pub fn header_tokens(line: &str) -> Vec<String> {
    let line = line.trim_end_matches(['\r', '\n']);
    if !line.starts_with("//") {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut tokens = line.split_whitespace();
    while let Some(tok) = tokens.next() {
        if tok.starts_with("---") {
            out.push(tok.to_string());
        } else if tok.starts_with('-') {
            out.push(tok.to_string());
            if let Some(value) = tokens.next() {
                out.push(value.to_string());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_line_format() {
        let header = LaunchHeader {
            local: vec![32, 1],
            global: vec![1024, 2],
            features: KernelFeatures {
                atomics: Some(4),
                inter_thread_comm: true,
                ..KernelFeatures::default()
            },
        };
        assert_eq!(
            header.to_line(),
            "// -l 32,1 -g 1024,2 --atomics 4 ---inter_thread_comm"
        );
    }

    #[test]
    fn tokens_round_trip() {
        let header = LaunchHeader {
            local: vec![64],
            global: vec![512],
            features: KernelFeatures {
                atomics: Some(2),
                emi: true,
                ..KernelFeatures::default()
            },
        };
        assert_eq!(
            header_tokens(&header.to_line()),
            vec!["-l", "64", "-g", "512", "--atomics", "2", "---emi"]
        );
    }

    #[test]
    fn non_comment_yields_nothing() {
        assert!(header_tokens("#include \"x.h\"").is_empty());
        assert!(header_tokens("").is_empty());
    }

    #[test]
    fn stray_words_skipped() {
        assert_eq!(header_tokens("// seed -g 8 words"), vec!["-g", "8"]);
    }
}
