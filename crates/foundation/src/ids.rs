use std::fmt;
use std::rc::Rc;

/// Caller-chosen string identifier (mount ids, view ids, tween ids).
///
/// Cheap to clone; compares and orders by its text.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(Rc<str>);

impl Id {
    pub fn new(text: impl AsRef<str>) -> Self {
        Self(Rc::from(text.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derives a namespaced child id, e.g. `hero` + `hover` -> `hero/hover`.
    pub fn child(&self, suffix: &str) -> Self {
        Self::new(format!("{}/{}", self.0, suffix))
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({:?})", &*self.0)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Self(Rc::from(value))
    }
}

impl From<&Id> for Id {
    fn from(value: &Id) -> Self {
        value.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::Id;

    #[test]
    fn ids_compare_by_text() {
        assert_eq!(Id::from("hero"), Id::new(String::from("hero")));
        assert!(Id::from("a") < Id::from("b"));
    }

    #[test]
    fn child_ids_are_namespaced() {
        let id = Id::from("hero-glass");
        assert_eq!(id.child("hover").as_str(), "hero-glass/hover");
        assert_eq!(id.to_string(), "hero-glass");
    }
}
