// runtime/wgsl.rs - WGSL front end shared by both adapters.
//
// Applies the build options, then parses and validates the result with naga.
// The host adapter uses the module directly; the wgpu adapter runs it ahead
// of `create_shader_module` so a broken kernel fails with naga's annotated
// diagnostic instead of a device-lost error, and so both adapters know the
// compute entry points a program exports.

use super::preprocess::preprocess;

/// A kernel that made it through the front end.
#[derive(Debug, Clone)]
pub struct CheckedSource {
    /// Source after placeholder substitution.
    pub source: String,
    /// Names of the `@compute` entry points, in declaration order.
    pub entry_points: Vec<String>,
    pub log: String,
}

/// Preprocess, parse and validate `source`.
///
/// On failure the error is the complete build log.
pub fn check(source: &str, options: &str) -> Result<CheckedSource, String> {
    let pre = preprocess(source, options);
    let mut log = pre.log.clone();
    if !pre.is_ok() {
        return Err(log.join("\n"));
    }

    let module = match naga::front::wgsl::parse_str(&pre.source) {
        Ok(m) => m,
        Err(e) => {
            log.push(e.emit_to_string(&pre.source));
            return Err(log.join("\n"));
        }
    };

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    if let Err(e) = validator.validate(&module) {
        log.push(e.emit_to_string(&pre.source));
        return Err(log.join("\n"));
    }

    let entry_points: Vec<String> = module
        .entry_points
        .iter()
        .filter(|ep| ep.stage == naga::ShaderStage::Compute)
        .map(|ep| ep.name.clone())
        .collect();
    log.push(format!(
        "info: {} compute entry point(s): {}",
        entry_points.len(),
        entry_points.join(", ")
    ));

    Ok(CheckedSource { source: pre.source, entry_points, log: log.join("\n") })
}
