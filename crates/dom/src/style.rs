/// One `name: value [!important]` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub value: String,
    pub important: bool,
}

/// An ordered declaration block, as found in a `style` attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleDeclarations {
    decls: Vec<Declaration>,
}

impl StyleDeclarations {
    /// Lenient parse: malformed declarations are skipped, later duplicates win.
    pub fn parse(css: &str) -> Self {
        let mut block = Self::default();
        for raw in css.split(';') {
            let Some((name, value)) = raw.split_once(':') else { continue };
            let name = name.trim().to_ascii_lowercase();
            let mut value = value.trim();
            if name.is_empty() || value.is_empty() {
                continue;
            }
            let mut important = false;
            if let Some(idx) = value.to_ascii_lowercase().rfind("!important") {
                important = true;
                value = value[..idx].trim_end();
            }
            block.set(&name, value, important);
        }
        block
    }

    pub fn get(&self, name: &str) -> Option<&Declaration> {
        self.decls.iter().find(|d| d.name == name)
    }

    pub fn set(&mut self, name: &str, value: &str, important: bool) {
        let name = name.to_ascii_lowercase();
        match self.decls.iter_mut().find(|d| d.name == name) {
            Some(existing) => {
                existing.value = value.to_string();
                existing.important = important;
            }
            None => self.decls.push(Declaration { name, value: value.to_string(), important }),
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.decls.len();
        self.decls.retain(|d| d.name != name);
        self.decls.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.decls.iter()
    }

    pub fn to_css_text(&self) -> String {
        self.decls
            .iter()
            .map(|d| {
                if d.important {
                    format!("{}: {} !important;", d.name, d.value)
                } else {
                    format!("{}: {};", d.name, d.value)
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Author stylesheet vs inline style: an important author rule beats a normal
/// inline one, otherwise inline wins.
pub fn cascade<'a>(author: &'a StyleDeclarations, inline: &'a StyleDeclarations, name: &str) -> Option<&'a str> {
    match (author.get(name), inline.get(name)) {
        (Some(a), Some(i)) if a.important && !i.important => Some(a.value.as_str()),
        (_, Some(i)) => Some(i.value.as_str()),
        (Some(a), None) => Some(a.value.as_str()),
        (None, None) => None,
    }
}
