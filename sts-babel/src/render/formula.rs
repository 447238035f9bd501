//! Formula conversion.
//!
//! [`MathTextConverter`] linearises presentation MathML into a compact text
//! form (`a^2`, `(x+1)/(y)`, `√(z)`). [`CommandFormulaConverter`] pipes the
//! fragment through an external program instead.

use super::FormulaConverter;
use crate::error::FormulaError;
use crate::tree::Node;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

const MATHML_NS: &str = "http://www.w3.org/1998/Math/MathML";

/// Serialise a math subtree as a standalone MathML document: prefixes are
/// dropped, namespace declarations replaced by the default MathML namespace.
pub fn math_fragment(node: &Node) -> Result<String, FormulaError> {
    let mut writer = Writer::new(Vec::new());
    write_math(node, &mut writer, true)
        .map_err(|err| FormulaError::Serialize(err.to_string()))?;
    String::from_utf8(writer.into_inner()).map_err(|err| FormulaError::Serialize(err.to_string()))
}

fn write_math(node: &Node, writer: &mut Writer<Vec<u8>>, root: bool) -> std::io::Result<()> {
    if node.is_text() {
        return writer.write_event(Event::Text(BytesText::new(&node.text)));
    }
    let name = node.tag.as_str();
    let local = name.rsplit(':').next().unwrap_or(name);
    let mut start = BytesStart::new(local);
    if root {
        start.push_attribute(("xmlns", MATHML_NS));
    }
    for (key, value) in &node.attributes {
        if key == "xmlns" || key.contains(':') {
            continue;
        }
        start.push_attribute((key.as_str(), value.as_str()));
    }
    writer.write_event(Event::Start(start))?;
    for child in &node.children {
        write_math(child, writer, false)?;
    }
    writer.write_event(Event::End(BytesEnd::new(local)))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MathTextConverter;

impl FormulaConverter for MathTextConverter {
    fn convert(&self, mathml: &str) -> Result<String, FormulaError> {
        let doc = roxmltree::Document::parse(mathml)
            .map_err(|err| FormulaError::Parse(err.to_string()))?;
        Ok(linearize(doc.root_element()).trim().to_string())
    }
}

fn linearize(node: roxmltree::Node) -> String {
    if node.is_text() {
        return node.text().unwrap_or_default().trim().to_string();
    }
    let elements: Vec<_> = node.children().filter(|c| c.is_element()).collect();
    let arg = |i: usize| elements.get(i).map(|n| group(*n)).unwrap_or_default();

    match node.tag_name().name() {
        "mi" | "mn" | "mtext" | "ms" => node.text().unwrap_or_default().trim().to_string(),
        "mo" => {
            let op = node.text().unwrap_or_default().trim();
            match op {
                "=" | "+" | "−" | "-" | "×" | "±" | "<" | ">" | "≤" | "≥" | "≠" => format!(" {op} "),
                _ => op.to_string(),
            }
        }
        "mspace" => " ".to_string(),
        "msup" => format!("{}^{}", arg(0), arg(1)),
        "msub" => format!("{}_{}", arg(0), arg(1)),
        "msubsup" => format!("{}_{}^{}", arg(0), arg(1), arg(2)),
        "mfrac" => format!("({})/({})", plain(&elements, 0), plain(&elements, 1)),
        "msqrt" => format!("√({})", concat(&elements)),
        "mroot" => format!("{}√({})", arg(1), plain(&elements, 0)),
        "mover" | "munder" => format!("{}{}", arg(0), plain(&elements, 1)),
        "munderover" => format!("{}_{}^{}", arg(0), arg(1), arg(2)),
        "mfenced" => {
            let open = node.attribute("open").unwrap_or("(");
            let close = node.attribute("close").unwrap_or(")");
            let separator = node.attribute("separators").unwrap_or(",");
            let inner: Vec<_> = elements.iter().map(|n| linearize(*n)).collect();
            format!("{open}{}{close}", inner.join(separator))
        }
        "mtable" => elements
            .iter()
            .map(|row| linearize(*row))
            .collect::<Vec<_>>()
            .join("; "),
        "mtr" | "mlabeledtr" => elements
            .iter()
            .map(|cell| linearize(*cell))
            .collect::<Vec<_>>()
            .join(", "),
        "semantics" => elements.first().map(|n| linearize(*n)).unwrap_or_default(),
        "annotation" | "annotation-xml" => String::new(),
        _ => concat(&elements),
    }
}

fn concat(elements: &[roxmltree::Node]) -> String {
    elements.iter().map(|n| linearize(*n)).collect()
}

fn plain(elements: &[roxmltree::Node], index: usize) -> String {
    elements
        .get(index)
        .map(|n| linearize(*n).trim().to_string())
        .unwrap_or_default()
}

/// Linearised operand, parenthesised when it is more than one token.
fn group(node: roxmltree::Node) -> String {
    let text = linearize(node).trim().to_string();
    if text.chars().count() > 1 && !matches!(node.tag_name().name(), "mi" | "mn" | "mtext") {
        format!("({text})")
    } else {
        text
    }
}

#[cfg(feature = "native-export")]
pub use command::CommandFormulaConverter;

#[cfg(feature = "native-export")]
mod command {
    use super::FormulaConverter;
    use crate::error::FormulaError;
    use std::io::Write;
    use std::path::PathBuf;
    use std::process::{Command, Stdio};
    use which::which;

    /// Runs an external converter: MathML on stdin, markup on stdout.
    #[derive(Debug, Clone)]
    pub struct CommandFormulaConverter {
        program: PathBuf,
        args: Vec<String>,
    }

    impl CommandFormulaConverter {
        /// Build from a command line such as `mml2text --inline`. The program
        /// is looked up on `PATH` unless it is a path.
        pub fn from_command_line(command: &str) -> Result<Self, FormulaError> {
            let mut parts = command.split_whitespace();
            let program = parts
                .next()
                .ok_or_else(|| FormulaError::Command("empty formula command".to_string()))?;
            let program = if program.contains(std::path::MAIN_SEPARATOR) {
                PathBuf::from(program)
            } else {
                which(program).map_err(|err| FormulaError::Command(format!("{program}: {err}")))?
            };
            Ok(CommandFormulaConverter {
                program,
                args: parts.map(str::to_string).collect(),
            })
        }
    }

    impl FormulaConverter for CommandFormulaConverter {
        fn convert(&self, mathml: &str) -> Result<String, FormulaError> {
            let command_error = |err: std::io::Error| {
                FormulaError::Command(format!("{}: {err}", self.program.display()))
            };
            let mut child = Command::new(&self.program)
                .args(&self.args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(command_error)?;
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(mathml.as_bytes()).map_err(command_error)?;
            }
            let output = child.wait_with_output().map_err(command_error)?;
            if !output.status.success() {
                return Err(FormulaError::Command(format!(
                    "{} exited with {}: {}",
                    self.program.display(),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Tag;

    fn convert(xml: &str) -> String {
        MathTextConverter.convert(xml).unwrap()
    }

    #[test]
    fn linearizes_scripts_and_fractions() {
        let xml = format!(
            r#"<math xmlns="{MATHML_NS}"><mrow><msup><mi>x</mi><mn>2</mn></msup><mo>+</mo><mfrac><mi>a</mi><mrow><mi>b</mi><mo>+</mo><mn>1</mn></mrow></mfrac></mrow></math>"#
        );
        assert_eq!(convert(&xml), "x^2 + (a)/(b + 1)");
    }

    #[test]
    fn groups_compound_exponents() {
        let xml = r#"<math><msup><mi>e</mi><mrow><mo>-</mo><mi>t</mi></mrow></msup></math>"#;
        assert_eq!(convert(xml), "e^(- t)");
    }

    #[test]
    fn linearizes_roots() {
        assert_eq!(convert("<math><msqrt><mi>z</mi></msqrt></math>"), "√(z)");
    }

    #[test]
    fn rejects_broken_markup() {
        assert!(matches!(
            MathTextConverter.convert("<math><mi>x</math>"),
            Err(FormulaError::Parse(_))
        ));
    }

    #[test]
    fn fragment_strips_prefixes() {
        let node = Node::new(1, Tag::Math)
            .with_attribute("xmlns:mml", "http://www.w3.org/1998/Math/MathML")
            .with_attribute("display", "block")
            .with_child(
                Node::new(2, Tag::Other("mml:mi".into())).with_child(Node::text_fragment(3, "x")),
            );
        let xml = math_fragment(&node).unwrap();
        assert_eq!(
            xml,
            format!(r#"<math xmlns="{MATHML_NS}" display="block"><mi>x</mi></math>"#)
        );
        assert_eq!(convert(&xml), "x");
    }

    #[test]
    fn fragment_escapes_text_and_attributes() {
        let node = Node::new(1, Tag::Math)
            .with_attribute("alttext", "a \"b\"")
            .with_child(
                Node::new(2, Tag::Other("mi".into())).with_child(Node::text_fragment(3, "a<b&c")),
            );
        let xml = math_fragment(&node).unwrap();
        assert_eq!(
            xml,
            format!(r#"<math xmlns="{MATHML_NS}" alttext="a &quot;b&quot;"><mi>a&lt;b&amp;c</mi></math>"#)
        );
        assert_eq!(convert(&xml), "a<b&c");
    }
}
