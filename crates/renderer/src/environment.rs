use std::fmt;
use std::str::FromStr;

/// The website dialect a fragment shader was written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// `mainImage(out vec4, in vec2)` with the `i*` uniform family.
    ShaderToy,
    /// Plain `main()` writing `gl_FragColor`, with `time`/`resolution`/`mouse`.
    GlslSandbox,
}

impl Environment {
    pub const NAMES: [&'static str; 2] = ["shadertoy", "glslsandbox"];

    /// Guesses the dialect from the shader source.
    pub fn detect(source: &str) -> Option<Self> {
        if crate::compile::references(source, "mainImage") {
            Some(Environment::ShaderToy)
        } else if crate::compile::references(source, "gl_FragColor") {
            Some(Environment::GlslSandbox)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Environment::ShaderToy => "shadertoy",
            Environment::GlslSandbox => "glslsandbox",
        }
    }

    /// Whether `iChannel` texture mappings have any meaning in this dialect.
    pub fn supports_channels(self) -> bool {
        matches!(self, Environment::ShaderToy)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEnvironment(pub String);

impl fmt::Display for UnknownEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown environment '{}'; expected one of: {}",
            self.0,
            Environment::NAMES.join(", ")
        )
    }
}

impl std::error::Error for UnknownEnvironment {}

impl FromStr for Environment {
    type Err = UnknownEnvironment;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "shadertoy" => Ok(Environment::ShaderToy),
            "glslsandbox" => Ok(Environment::GlslSandbox),
            _ => Err(UnknownEnvironment(value.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_dialect_from_entry_point() {
        let toy = "void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }";
        assert_eq!(Environment::detect(toy), Some(Environment::ShaderToy));

        let sandbox = "void main(void) { gl_FragColor = vec4(1.0, 0.0, 0.0, 1.0); }";
        assert_eq!(Environment::detect(sandbox), Some(Environment::GlslSandbox));

        assert_eq!(Environment::detect("void main() {}"), None);
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("ShaderToy".parse(), Ok(Environment::ShaderToy));
        assert_eq!("glslsandbox".parse(), Ok(Environment::GlslSandbox));
        let err = "webgl".parse::<Environment>().unwrap_err();
        assert!(err.to_string().contains("shadertoy, glslsandbox"));
    }
}
