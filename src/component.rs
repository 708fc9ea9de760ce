//! Parameter components: named groups of physical parameters shared between
//! fitting routines and the orchestrator.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use crate::error::{Result, SpecFitError};
use crate::init::Initializer;

/// A single physical parameter with its current value and optional bounds.
#[derive(Clone, Debug)]
pub struct Parameter {
    name: String,
    value: f64,
    initial: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl Parameter {
    /// Creates an unbounded parameter whose current value equals its initial value.
    pub fn new(name: impl Into<String>, initial: f64) -> Self {
        Self {
            name: name.into(),
            value: initial,
            initial,
            min: None,
            max: None,
        }
    }

    /// Restricts the parameter to `[min, max]`.
    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Parameter name without the component prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Lower bound, if any.
    pub fn min(&self) -> Option<f64> {
        self.min
    }

    /// Upper bound, if any.
    pub fn max(&self) -> Option<f64> {
        self.max
    }

    fn clamp(&self, value: f64) -> f64 {
        let mut v = value;
        if let Some(min) = self.min {
            v = v.max(min);
        }
        if let Some(max) = self.max {
            v = v.min(max);
        }
        v
    }
}

/// A named holder for a set of physical parameters sharing one prefix.
///
/// Parameter identities are formed as `"<prefix> <name>"` and must be unique
/// within a [`ComponentSet`]. Routines mutate the parameter values in place
/// while the orchestrator reads snapshots and triggers bulk resets.
#[derive(Clone)]
pub struct Component {
    prefix: String,
    params: Vec<Parameter>,
    initializer: Option<Rc<dyn Initializer>>,
}

impl Component {
    /// Creates an empty component with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            params: Vec::new(),
            initializer: None,
        }
    }

    /// Adds a parameter, preserving declaration order.
    pub fn with_parameter(mut self, param: Parameter) -> Self {
        self.params.push(param);
        self
    }

    /// Attaches an initializer that supplies filename-specific starting values.
    pub fn with_initializer(mut self, initializer: Rc<dyn Initializer>) -> Self {
        self.initializer = Some(initializer);
        self
    }

    /// Component prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Ordered list of parameter names.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// True when the component holds no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Full identity of a parameter, `"<prefix> <name>"`.
    pub fn identity(&self, name: &str) -> String {
        format!("{} {}", self.prefix, name)
    }

    /// All parameter identities in declaration order.
    pub fn identities(&self) -> Vec<String> {
        self.params.iter().map(|p| self.identity(&p.name)).collect()
    }

    /// Current value of a parameter.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.params.iter().find(|p| p.name == name).map(|p| p.value)
    }

    /// Sets a parameter's current value, clamped to its bounds.
    pub fn set_value(&mut self, name: &str, value: f64) -> Result<()> {
        let identity = self.identity(name);
        let param = self
            .params
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| SpecFitError::unknown_parameter(identity))?;
        param.value = param.clamp(value);
        Ok(())
    }

    /// Overrides a parameter's lower bound.
    pub fn set_min(&mut self, name: &str, min: f64) -> Result<()> {
        let identity = self.identity(name);
        let param = self
            .params
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| SpecFitError::unknown_parameter(identity))?;
        param.min = Some(min);
        Ok(())
    }

    /// Overrides a parameter's upper bound.
    pub fn set_max(&mut self, name: &str, max: f64) -> Result<()> {
        let identity = self.identity(name);
        let param = self
            .params
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| SpecFitError::unknown_parameter(identity))?;
        param.max = Some(max);
        Ok(())
    }

    /// Resolves a full identity to a parameter name of this component.
    pub fn name_of(&self, identity: &str) -> Option<String> {
        self.params
            .iter()
            .find(|p| self.identity(&p.name) == identity)
            .map(|p| p.name.clone())
    }

    /// Resets every parameter to its initial value, then applies the attached
    /// initializer (if any) for the given filename.
    pub fn init(&mut self, filename: &str) -> Result<()> {
        for param in &mut self.params {
            param.value = param.initial;
        }
        if let Some(initializer) = self.initializer.clone() {
            initializer.init_component(self, filename)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("prefix", &self.prefix)
            .field("params", &self.params)
            .field("initializer", &self.initializer.is_some())
            .finish()
    }
}

/// Shared handle to a component, cloned between routines and the orchestrator.
pub type SharedComponent = Rc<RefCell<Component>>;

/// Wraps a component in a shared handle.
pub fn shared(component: Component) -> SharedComponent {
    Rc::new(RefCell::new(component))
}

/// A bounded, enumerable collection of shared components.
///
/// The set rejects duplicate parameter identities so that the identity strings
/// used throughout result bookkeeping stay unambiguous.
#[derive(Clone, Default)]
pub struct ComponentSet {
    components: Vec<SharedComponent>,
}

impl ComponentSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a shared component, checking for identity collisions.
    pub fn push(&mut self, component: SharedComponent) -> Result<()> {
        let mut seen: HashSet<String> = self
            .components
            .iter()
            .flat_map(|c| c.borrow().identities())
            .collect();
        for identity in component.borrow().identities() {
            if !seen.insert(identity.clone()) {
                return Err(SpecFitError::DuplicateParameter { identity });
            }
        }
        self.components.push(component);
        Ok(())
    }

    /// Builds a set from owned components.
    pub fn from_components(components: Vec<Component>) -> Result<Self> {
        let mut set = Self::new();
        for component in components {
            set.push(shared(component))?;
        }
        Ok(set)
    }

    /// Iterates over the shared components.
    pub fn components(&self) -> impl Iterator<Item = &SharedComponent> {
        self.components.iter()
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// True when the set is empty.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// All parameter identities across all components.
    pub fn identities(&self) -> Vec<String> {
        self.components
            .iter()
            .flat_map(|c| c.borrow().identities())
            .collect()
    }

    /// Current value of the parameter with the given identity.
    pub fn value(&self, identity: &str) -> Option<f64> {
        for component in &self.components {
            let component = component.borrow();
            if let Some(name) = component.name_of(identity) {
                return component.value(&name);
            }
        }
        None
    }

    /// Sets the parameter with the given identity.
    pub fn set_value(&self, identity: &str, value: f64) -> Result<()> {
        for component in &self.components {
            let mut component = component.borrow_mut();
            if let Some(name) = component.name_of(identity) {
                return component.set_value(&name, value);
            }
        }
        Err(SpecFitError::unknown_parameter(identity))
    }

    /// Snapshot of the current values of the given identities.
    ///
    /// Identities that match no component are silently absent from the map.
    pub fn snapshot(&self, identities: &HashSet<String>) -> HashMap<String, f64> {
        let mut snapshot = HashMap::new();
        for component in &self.components {
            let component = component.borrow();
            for identity in component.identities() {
                if identities.contains(&identity) {
                    if let Some(name) = component.name_of(&identity) {
                        if let Some(value) = component.value(&name) {
                            snapshot.insert(identity, value);
                        }
                    }
                }
            }
        }
        snapshot
    }

    /// Snapshot of every parameter's current value.
    pub fn snapshot_all(&self) -> HashMap<String, f64> {
        let identities: HashSet<String> = self.identities().into_iter().collect();
        self.snapshot(&identities)
    }

    /// Resets every component to its filename-specific initial values.
    pub fn init_all(&self, filename: &str) -> Result<()> {
        for component in &self.components {
            component.borrow_mut().init(filename)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ComponentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentSet")
            .field("identities", &self.identities())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn star_component() -> Component {
        Component::new("star")
            .with_parameter(Parameter::new("Teff", 5000.0).with_bounds(3000.0, 9000.0))
            .with_parameter(Parameter::new("v", 0.0))
    }

    #[test]
    fn identities_carry_prefix() {
        let cmp = star_component();
        assert_eq!(cmp.identities(), vec!["star Teff", "star v"]);
    }

    #[test]
    fn set_value_clamps_to_bounds() {
        let mut cmp = star_component();
        cmp.set_value("Teff", 12_000.0).unwrap();
        assert_eq!(cmp.value("Teff"), Some(9000.0));
        cmp.set_value("Teff", 100.0).unwrap();
        assert_eq!(cmp.value("Teff"), Some(3000.0));
    }

    #[test]
    fn init_restores_initial_values() {
        let mut cmp = star_component();
        cmp.set_value("v", 42.0).unwrap();
        cmp.init("spectrum.fits").unwrap();
        assert_eq!(cmp.value("v"), Some(0.0));
    }

    #[test]
    fn set_rejects_duplicate_identities() {
        let mut set = ComponentSet::new();
        set.push(shared(star_component())).unwrap();
        let result = set.push(shared(star_component()));
        assert!(matches!(
            result,
            Err(SpecFitError::DuplicateParameter { .. })
        ));
    }

    #[test]
    fn set_value_reaches_the_right_component() {
        let set = ComponentSet::from_components(vec![
            star_component(),
            Component::new("tellurics").with_parameter(Parameter::new("v", 1.0)),
        ])
        .unwrap();

        set.set_value("tellurics v", 3.0).unwrap();
        assert_eq!(set.value("tellurics v"), Some(3.0));
        assert_eq!(set.value("star v"), Some(0.0));

        let missing = set.set_value("moon v", 1.0);
        assert!(matches!(missing, Err(SpecFitError::UnknownParameter { .. })));
    }
}
