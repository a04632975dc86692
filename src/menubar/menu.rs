#[derive(Debug, Clone, PartialEq)]
pub struct MenuSpec {
    pub items: Vec<MenuItem>,
}

impl MenuSpec {
    pub fn new(items: Vec<MenuItem>) -> Self {
        Self { items }
    }

    /// Submenus at the top level, in order.
    pub fn submenus(&self) -> impl Iterator<Item = (&str, &[MenuItem])> {
        self.items.iter().filter_map(|item| match item {
            MenuItem::Submenu { title, items } => Some((title.as_str(), items.as_slice())),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MenuItem {
    Header(String),
    Separator,
    Action {
        id: u16,
        title: String,
        checked: bool,
        enabled: bool,
    },
    /// A popup item owning an ordered dropdown of child items.
    Submenu { title: String, items: Vec<MenuItem> },
}
