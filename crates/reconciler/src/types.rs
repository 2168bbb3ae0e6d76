//! Logical child descriptions.
//!
//! A `Child` is what a parent *wants* its children to be for the next pass. The
//! reconciler consumes it against the previous sibling chain; it is never
//! stored as-is except inside `Props` (children of an element) and
//! `PendingProps::Children` (fragments, portals, roots).

use crate::deferred::Deferred;
use core_types::ContainerId;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Explicit sibling identity supplied by the description author.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Arc<str>);

impl Key {
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Key(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({:?})", self.0)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::new(value)
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::new(value)
    }
}

/// Element type discriminator carried by an `Element` description.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// Host element, e.g. `div`. Names are compared exactly.
    Host(Arc<str>),
    /// Stateful component; owns an update queue once mounted.
    Component(Arc<str>),
    /// Keyed or unkeyed grouping without a host counterpart.
    Fragment,
}

impl ElementType {
    pub fn host_name(&self) -> Option<&str> {
        match self {
            ElementType::Host(name) => Some(name),
            ElementType::Component(_) | ElementType::Fragment => None,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            ElementType::Host(name) | ElementType::Component(name) => name,
            ElementType::Fragment => "#fragment",
        }
    }
}

/// Element attributes plus the element's own children description.
///
/// Both halves are reference counted so reusing a node never deep-copies a
/// subtree description.
#[derive(Clone, Debug, Default)]
pub struct Props {
    attrs: Rc<BTreeMap<Arc<str>, Value>>,
    children: Option<Rc<Child>>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attr(mut self, name: impl Into<Arc<str>>, value: impl Into<Value>) -> Self {
        Rc::make_mut(&mut self.attrs).insert(name.into(), value.into());
        self
    }

    pub fn with_children(mut self, children: impl Into<Child>) -> Self {
        self.children = Some(Rc::new(children.into()));
        self
    }

    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    pub fn attrs(&self) -> &BTreeMap<Arc<str>, Value> {
        &self.attrs
    }

    pub fn children(&self) -> Option<&Child> {
        self.children.as_deref()
    }

    /// Shared handle to the children description; absent children read as `Empty`.
    pub fn children_rc(&self) -> Rc<Child> {
        match &self.children {
            Some(children) => Rc::clone(children),
            None => Rc::new(Child::Empty),
        }
    }

    pub fn same_attrs(&self, other: &Props) -> bool {
        Rc::ptr_eq(&self.attrs, &other.attrs) || self.attrs == other.attrs
    }

    /// Identity check used for bailouts: both halves are the same allocation.
    pub fn ptr_eq(&self, other: &Props) -> bool {
        let children_same = match (&self.children, &other.children) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        children_same && Rc::ptr_eq(&self.attrs, &other.attrs)
    }
}

#[derive(Clone, Debug)]
pub struct Element {
    pub key: Option<Key>,
    pub ty: ElementType,
    pub props: Props,
}

impl Element {
    pub fn new(ty: ElementType) -> Self {
        Self {
            key: None,
            ty,
            props: Props::default(),
        }
    }

    pub fn host(name: impl Into<Arc<str>>) -> Self {
        Self::new(ElementType::Host(name.into()))
    }

    pub fn component(name: impl Into<Arc<str>>) -> Self {
        Self::new(ElementType::Component(name.into()))
    }

    pub fn fragment(children: impl Into<Child>) -> Self {
        Self::new(ElementType::Fragment).with_children(children)
    }

    pub fn keyed(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn attr(mut self, name: impl Into<Arc<str>>, value: impl Into<Value>) -> Self {
        self.props = self.props.with_attr(name, value);
        self
    }

    pub fn with_children(mut self, children: impl Into<Child>) -> Self {
        self.props = self.props.with_children(children);
        self
    }
}

/// Children rendered into a different host container.
#[derive(Clone, Debug)]
pub struct Portal {
    pub key: Option<Key>,
    pub container: ContainerId,
    pub children: Rc<Child>,
}

impl Portal {
    pub fn new(container: ContainerId, children: impl Into<Child>) -> Self {
        Self {
            key: None,
            container,
            children: Rc::new(children.into()),
        }
    }

    pub fn keyed(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// Identity of a context whose value can be read as a child description.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(pub u32);

/// A context read in child position; resolves to the provided value or `default`.
#[derive(Clone, Debug)]
pub struct ContextRead {
    pub context: ContextId,
    pub default: Rc<Child>,
}

impl ContextRead {
    pub fn new(context: ContextId, default: impl Into<Child>) -> Self {
        Self {
            context,
            default: Rc::new(default.into()),
        }
    }
}

/// Child description resolved from a deferred payload the first time it is seen.
///
/// Unlike `Child::Deferred`, a lazy value is not tracked by position: once the
/// payload settles every read observes the same result.
#[derive(Clone, Debug)]
pub struct Lazy {
    pub payload: Deferred<Child>,
}

/// Pull-based sequence of children.
///
/// Holds a factory rather than a live iterator: every reconciliation attempt
/// opens a fresh cursor, so a replay after suspension or a re-render of the
/// same description walks the items from the start again.
#[derive(Clone)]
pub struct ChildIter {
    open: Rc<dyn Fn() -> Box<dyn Iterator<Item = Child>>>,
}

impl ChildIter {
    pub fn new<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Child> + Clone + 'static,
        I::IntoIter: 'static,
    {
        Self {
            open: Rc::new(move || Box::new(items.clone().into_iter()) as Box<dyn Iterator<Item = Child>>),
        }
    }

    pub(crate) fn cursor(&self) -> Box<dyn Iterator<Item = Child>> {
        (self.open)()
    }
}

impl fmt::Debug for ChildIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChildIter(..)")
    }
}

/// Source of an asynchronous children sequence.
///
/// Sources are re-iterable: every reconciliation attempt walks the steps from
/// index 0 again, and the indexed deferred tracking makes replayed steps
/// observe the values of the suspended attempt.
pub trait AsyncChildSource {
    /// Deferred for the `index`-th step; settles to `None` past the end.
    fn step(&self, index: usize) -> Deferred<Option<Child>>;
}

#[derive(Clone)]
pub struct AsyncChildIter {
    source: Rc<dyn AsyncChildSource>,
}

impl AsyncChildIter {
    pub fn new(source: impl AsyncChildSource + 'static) -> Self {
        Self {
            source: Rc::new(source),
        }
    }

    pub(crate) fn step(&self, index: usize) -> Deferred<Option<Child>> {
        self.source.step(index)
    }
}

impl fmt::Debug for AsyncChildIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AsyncChildIter(..)")
    }
}

/// Logical description of the children wanted for the next pass.
#[derive(Clone, Debug, Default)]
pub enum Child {
    /// Renders nothing (null, booleans, undefined).
    #[default]
    Empty,
    Text(Arc<str>),
    Number(f64),
    Element(Element),
    Portal(Portal),
    List(Vec<Child>),
    Iter(ChildIter),
    AsyncIter(AsyncChildIter),
    Deferred(Deferred<Child>),
    Lazy(Lazy),
    Context(ContextRead),
    /// A function value in child position; reported and rendered as nothing.
    Callable(Arc<str>),
    /// Object of unsupported shape; reconciling it is a hard error.
    Opaque(Arc<str>),
}

impl Child {
    pub fn text(value: impl Into<Arc<str>>) -> Self {
        Child::Text(value.into())
    }

    pub fn list(items: impl IntoIterator<Item = Child>) -> Self {
        Child::List(items.into_iter().collect())
    }

    /// Text content for text-like descriptions.
    pub(crate) fn as_text(&self) -> Option<Arc<str>> {
        match self {
            Child::Text(text) => Some(Arc::clone(text)),
            Child::Number(value) => Some(Arc::from(value.to_string())),
            _ => None,
        }
    }

    /// Text that renders as nothing is treated like `Empty`.
    pub(crate) fn is_empty_text(&self) -> bool {
        matches!(self, Child::Text(text) if text.is_empty())
    }
}

impl From<Element> for Child {
    fn from(value: Element) -> Self {
        Child::Element(value)
    }
}

impl From<Portal> for Child {
    fn from(value: Portal) -> Self {
        Child::Portal(value)
    }
}

impl From<&str> for Child {
    fn from(value: &str) -> Self {
        Child::text(value)
    }
}

impl From<String> for Child {
    fn from(value: String) -> Self {
        Child::text(value)
    }
}

impl From<Vec<Child>> for Child {
    fn from(value: Vec<Child>) -> Self {
        Child::List(value)
    }
}

impl From<Vec<Element>> for Child {
    fn from(value: Vec<Element>) -> Self {
        Child::List(value.into_iter().map(Child::Element).collect())
    }
}

impl From<Deferred<Child>> for Child {
    fn from(value: Deferred<Child>) -> Self {
        Child::Deferred(value)
    }
}

impl From<Option<Child>> for Child {
    fn from(value: Option<Child>) -> Self {
        value.unwrap_or_default()
    }
}
