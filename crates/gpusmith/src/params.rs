//! Positional kernel parameters.
//!
//! The entry function takes its buffers in a fixed order that depends only
//! on which optional features are enabled. The generator renders the
//! parameter list from [`KernelFeatures::params`] and the launcher allocates
//! from the same list, so the two cannot drift apart.

use crate::types::{ScalarKind, Type};
use serde::{Deserialize, Serialize};

/// Length of the EMI input buffer.
pub const EMI_INPUT_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KernelParam {
    /// One checksum per thread.
    Result,
    /// Atomic counters, `regions` lanes per group.
    AtomicInput,
    /// Special-value lanes paired with the counters.
    SpecialValues,
    /// One reduction target per group.
    AtomicReduction,
    /// Dead-code injection input, `1024 - i`.
    EmiInput,
    /// Fake-divergence sequence, `10 + i` over the largest global dimension.
    SequenceInput,
    /// Inter-thread communication values, one per thread.
    CommValues,
}

impl KernelParam {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Result => "result",
            Self::AtomicInput => "g_atomic_input",
            Self::SpecialValues => "g_special_values",
            Self::AtomicReduction => "g_atomic_reduction",
            Self::EmiInput => "emi_input",
            Self::SequenceInput => "sequence_input",
            Self::CommValues => "g_comm_values",
        }
    }

    #[must_use]
    pub const fn elem(self) -> Type {
        match self {
            Self::Result => Type::Scalar(ScalarKind::ULong),
            Self::AtomicInput | Self::SpecialValues => Type::Scalar(ScalarKind::UInt),
            Self::AtomicReduction | Self::EmiInput | Self::SequenceInput => {
                Type::Scalar(ScalarKind::Int)
            }
            Self::CommValues => Type::Scalar(ScalarKind::Long),
        }
    }

    /// `uint *g_atomic_input`
    #[must_use]
    pub fn c_decl(self) -> String {
        format!("{} *{}", self.elem(), self.name())
    }
}

/// Optional kernel features that change the parameter list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelFeatures {
    /// Counter lanes per group when atomics are on.
    pub atomics: Option<usize>,
    pub atomic_reductions: bool,
    pub emi: bool,
    pub fake_divergence: bool,
    pub inter_thread_comm: bool,
}

impl KernelFeatures {
    /// Parameters in positional order.
    #[must_use]
    pub fn params(&self) -> Vec<KernelParam> {
        let mut params = vec![KernelParam::Result];
        if self.atomics.is_some() {
            params.push(KernelParam::AtomicInput);
            params.push(KernelParam::SpecialValues);
        }
        if self.atomic_reductions {
            params.push(KernelParam::AtomicReduction);
        }
        if self.emi {
            params.push(KernelParam::EmiInput);
        }
        if self.fake_divergence {
            params.push(KernelParam::SequenceInput);
        }
        if self.inter_thread_comm {
            params.push(KernelParam::CommValues);
        }
        params
    }
}

/// Parameter names of the `entry` function declared in kernel `source`.
///
/// Returns `None` when no `entry(` declaration is found.
#[must_use]
pub fn entry_param_names(source: &str) -> Option<Vec<String>> {
    let start = source.find("void entry(")? + "void entry(".len();
    let len = source[start..].find(')')?;
    let list = source[start..start + len].trim();
    if list.is_empty() || list == "void" {
        return Some(Vec::new());
    }
    Some(
        list.split(',')
            .map(|decl| {
                decl.trim()
                    .rsplit(|c: char| c.is_whitespace() || c == '*')
                    .next()
                    .unwrap_or_default()
                    .to_string()
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_kernel_has_only_result() {
        assert_eq!(KernelFeatures::default().params(), vec![KernelParam::Result]);
    }

    #[test]
    fn full_feature_order() {
        let features = KernelFeatures {
            atomics: Some(4),
            atomic_reductions: true,
            emi: true,
            fake_divergence: true,
            inter_thread_comm: true,
        };
        assert_eq!(
            features.params(),
            vec![
                KernelParam::Result,
                KernelParam::AtomicInput,
                KernelParam::SpecialValues,
                KernelParam::AtomicReduction,
                KernelParam::EmiInput,
                KernelParam::SequenceInput,
                KernelParam::CommValues,
            ]
        );
    }

    #[test]
    fn param_declarations() {
        assert_eq!(KernelParam::Result.c_decl(), "ulong *result");
        assert_eq!(KernelParam::CommValues.c_decl(), "long *g_comm_values");
    }

    #[test]
    fn entry_names_from_source() {
        let src = "// -l 1 -g 1\nextern \"C\" __global__ void entry(ulong *result, uint* g_atomic_input,\n    uint *g_special_values)\n{\n}\n";
        assert_eq!(
            entry_param_names(src).unwrap(),
            vec!["result", "g_atomic_input", "g_special_values"]
        );
        assert_eq!(entry_param_names("void entry() {}").unwrap(), Vec::<String>::new());
        assert_eq!(entry_param_names("__global__ void main_kernel(int *x) {}"), None);
    }

    #[test]
    fn entry_names_match_feature_params() {
        let features = KernelFeatures {
            atomics: Some(2),
            emi: true,
            ..KernelFeatures::default()
        };
        let decls: Vec<String> = features.params().into_iter().map(KernelParam::c_decl).collect();
        let src = format!("void entry({})", decls.join(", "));
        let expected: Vec<&str> = features.params().into_iter().map(KernelParam::name).collect();
        assert_eq!(entry_param_names(&src).unwrap(), expected);
    }
}
