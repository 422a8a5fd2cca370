// runtime/preprocess.rs - Build-option handling shared by both adapters.
//
// WGSL has no preprocessor, so macro definitions in the build options are
// applied as template substitution, the same `{{NAME}}` scheme the GPU
// kernels use for their workgroup size:
//
//   @compute @workgroup_size({{WG_X}}, {{WG_Y}}, 1)
//
// built with "-D WG_X=16 -D WG_Y=8". Recognized flags:
//
//   -D NAME=VALUE   -DNAME=VALUE   -D NAME   (value defaults to 1)
//
// Anything else is kept as a warning line for the build log. A placeholder
// that no definition resolves is an error: the resulting source would not
// parse, and naming the placeholder is a better diagnostic than the parser's.

use std::collections::BTreeMap;

/// Parsed build options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    pub defines: BTreeMap<String, String>,
    /// Flags the adapter does not understand, kept for the build log.
    pub ignored: Vec<String>,
}

impl BuildOptions {
    pub fn parse(options: &str) -> BuildOptions {
        let mut out = BuildOptions::default();
        let mut tokens = options.split_whitespace();
        while let Some(tok) = tokens.next() {
            let def = if tok == "-D" {
                match tokens.next() {
                    Some(d) => d,
                    None => {
                        out.ignored.push(tok.to_string());
                        continue;
                    }
                }
            } else if let Some(rest) = tok.strip_prefix("-D") {
                rest
            } else {
                out.ignored.push(tok.to_string());
                continue;
            };

            let (name, value) = match def.split_once('=') {
                Some((n, v)) => (n, v),
                None => (def, "1"),
            };
            if name.is_empty() {
                out.ignored.push(tok.to_string());
                continue;
            }
            out.defines.insert(name.to_string(), value.to_string());
        }
        out
    }
}

/// Source after substitution plus the log lines produced while doing it.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub source: String,
    pub log: Vec<String>,
    /// Placeholders left in the source.
    pub unresolved: Vec<String>,
}

impl Preprocessed {
    pub fn is_ok(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Apply `options` to `source`.
pub fn preprocess(source: &str, options: &str) -> Preprocessed {
    let opts = BuildOptions::parse(options);
    let mut log = Vec::new();
    for flag in &opts.ignored {
        log.push(format!("warning: ignoring unrecognized build option `{flag}`"));
    }

    let mut text = source.to_string();
    for (name, value) in &opts.defines {
        text = text.replace(&format!("{{{{{name}}}}}"), value);
    }

    let unresolved = find_placeholders(&text);
    for name in &unresolved {
        log.push(format!(
            "error: placeholder `{{{{{name}}}}}` has no definition (pass -D {name}=<value>)"
        ));
    }

    Preprocessed { source: text, log, unresolved }
}

fn find_placeholders(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else { break };
        let name = &after[..end];
        if !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !found.iter().any(|f| f == name)
        {
            found.push(name.to_string());
        }
        rest = &after[end + 2..];
    }
    found
}
