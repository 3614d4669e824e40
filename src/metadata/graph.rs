use super::{
    FieldData, FieldId, MethodData, MethodFlags, MethodId, ProgramMetadata, TypeData, TypeId,
};
use crate::il::MethodBody;
use elsa::map::FrozenMap;
use elsa::FrozenVec;

/// Append-only store of the types, fields, methods and bodies of a program
///
/// Everything is added through `&self` and never removed, so references handed out (eg. to a
/// method body) remain valid while more entities are added. This is what lets the analysis
/// request array types on demand while holding on to bodies it is still analyzing.
///
/// A fresh graph already contains the core types `Object`, `String`, and `Type`.
pub struct ProgramGraph {
    types: FrozenVec<Box<TypeData>>,
    fields: FrozenVec<Box<FieldData>>,
    methods: FrozenVec<Box<MethodData>>,
    bodies: FrozenMap<MethodId, Box<MethodBody>>,

    /// Types by name
    type_names: FrozenMap<String, Box<TypeId>>,

    /// Array types by element type
    array_types: FrozenMap<TypeId, Box<TypeId>>,

    /// Type initializers by declaring type
    static_constructors: FrozenMap<TypeId, Box<MethodId>>,

    object: TypeId,
    string: TypeId,
    runtime_type: TypeId,
}

impl ProgramGraph {
    pub const OBJECT: &'static str = "Object";
    pub const STRING: &'static str = "String";
    pub const TYPE: &'static str = "Type";

    /// New graph with only the core types
    pub fn new() -> ProgramGraph {
        let mut graph = ProgramGraph {
            types: FrozenVec::new(),
            fields: FrozenVec::new(),
            methods: FrozenVec::new(),
            bodies: FrozenMap::new(),
            type_names: FrozenMap::new(),
            array_types: FrozenMap::new(),
            static_constructors: FrozenMap::new(),
            object: TypeId(0),
            string: TypeId(0),
            runtime_type: TypeId(0),
        };

        let object = graph.add_type(TypeData::new(Self::OBJECT, None));
        graph.object = object;
        graph.string = graph.add_type(TypeData::new(Self::STRING, Some(object)));
        graph.runtime_type = graph.add_type(TypeData::new(Self::TYPE, Some(object)));
        graph
    }

    pub fn object_type(&self) -> TypeId {
        self.object
    }

    pub fn lookup_type(&self, name: &str) -> Option<TypeId> {
        self.type_names.get(name).copied()
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Add a type
    ///
    /// If the name is already taken, the new type is still added but name lookups keep
    /// resolving to the first one.
    pub fn add_type(&self, data: TypeData) -> TypeId {
        let id = TypeId(self.types.len());
        let name = data.name.clone();
        self.types.push(Box::new(data));
        if self.type_names.get(name.as_str()).is_none() {
            self.type_names.insert(name, Box::new(id));
        }
        log::trace!("added {} ({})", self.types[id.0].name, id);
        id
    }

    /// Add a class deriving directly from `Object`
    pub fn add_class(&self, name: impl Into<String>) -> TypeId {
        self.add_type(TypeData::new(name, Some(self.object)))
    }

    pub fn add_field(&self, field: FieldData) -> FieldId {
        let id = FieldId(self.fields.len());
        self.fields.push(Box::new(field));
        id
    }

    /// Add a method
    ///
    /// Methods flagged as type initializers become the static constructor of their declaring
    /// type (the first one registered wins).
    pub fn add_method(&self, method: MethodData) -> MethodId {
        let id = MethodId(self.methods.len());
        let declaring_type = method.declaring_type;
        let is_type_initializer = method.flags.contains(MethodFlags::TYPE_INITIALIZER);
        self.methods.push(Box::new(method));

        if is_type_initializer && self.static_constructors.get(&declaring_type).is_none() {
            self.static_constructors.insert(declaring_type, Box::new(id));
        }
        id
    }

    /// Attach a body to a method
    ///
    /// Bodies are immutable once attached: returns `false` (and drops `body`) if the method
    /// already has one.
    pub fn set_body(&self, method: MethodId, body: MethodBody) -> bool {
        if self.bodies.get(&method).is_some() {
            log::warn!("{} already has a body", method);
            return false;
        }
        self.bodies.insert(method, Box::new(body));
        true
    }
}

impl Default for ProgramGraph {
    fn default() -> ProgramGraph {
        ProgramGraph::new()
    }
}

impl ProgramMetadata for ProgramGraph {
    fn type_data(&self, ty: TypeId) -> &TypeData {
        &self.types[ty.0]
    }

    fn field(&self, field: FieldId) -> &FieldData {
        &self.fields[field.0]
    }

    fn method(&self, method: MethodId) -> &MethodData {
        &self.methods[method.0]
    }

    fn method_body(&self, method: MethodId) -> Option<&MethodBody> {
        self.bodies.get(&method)
    }

    fn static_constructor_of(&self, ty: TypeId) -> Option<MethodId> {
        self.static_constructors.get(&ty).copied()
    }

    fn string_type(&self) -> TypeId {
        self.string
    }

    fn runtime_type_type(&self) -> TypeId {
        self.runtime_type
    }

    fn array_type_of(&self, element: TypeId) -> TypeId {
        if let Some(array) = self.array_types.get(&element) {
            return *array;
        }

        let name = format!("{}[]", self.type_data(element).name);
        let array = self.add_type(TypeData {
            name,
            base: Some(self.object),
            element: Some(element),
        });
        self.array_types.insert(element, Box::new(array));
        array
    }
}
