use crate::dom::{DomAdapter, MODULE_ATTR, NodeId};

/// A parsed `data-module` attribute.
///
/// The first whitespace-delimited token names the module; any further tokens
/// are flags. Flags are exposed to hosts and components but the engine does
/// not act on them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleDeclaration {
    pub name: String,
    pub flags: Vec<String>,
}

impl ModuleDeclaration {
    pub fn parse(value: &str) -> Self {
        let mut tokens = value.split_whitespace();
        let name = tokens.next().unwrap_or_default().to_string();
        let flags = tokens.map(str::to_string).collect();
        Self { name, flags }
    }

    pub fn from_element(dom: &dyn DomAdapter, element: NodeId) -> Option<Self> {
        dom.attribute(element, MODULE_ATTR).map(|value| Self::parse(&value))
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    pub fn is_deferred(&self) -> bool {
        self.has_flag("deferred")
    }
}
