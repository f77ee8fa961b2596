//! Indented source emitter.

/// Line-oriented writer that tracks brace depth.
#[derive(Debug, Default)]
pub struct Emitter {
    out: String,
    indent: usize,
}

impl Emitter {
    const INDENT: &'static str = "    ";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.indent {
            self.out.push_str(Self::INDENT);
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// `{` and indent.
    pub fn open(&mut self) {
        self.line("{");
        self.indent += 1;
    }

    /// Dedent and `}` with an optional suffix such as `;`.
    pub fn close_with(&mut self, suffix: &str) {
        self.indent = self.indent.saturating_sub(1);
        self.line(format!("}}{suffix}"));
    }

    pub fn close(&mut self) {
        self.close_with("");
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    #[must_use]
    pub fn finish(self) -> String {
        self.out
    }
}

/// `[d0][d1]...` suffix of an array declaration.
#[must_use]
pub fn dims_suffix(dims: &[usize]) -> String {
    dims.iter().map(|d| format!("[{d}]")).collect()
}

/// Brace initializer repeating `value` over every element of `dims`.
#[must_use]
pub fn array_initializer(dims: &[usize], value: &str) -> String {
    match dims.split_first() {
        None => value.to_string(),
        Some((&len, rest)) => {
            let inner = array_initializer(rest, value);
            let items = vec![inner; len];
            format!("{{{}}}", items.join(", "))
        }
    }
}
