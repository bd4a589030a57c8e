//! Operation visitor protocol
//!
//! [`OperationVisitor`] has one required method per [`Operation`] variant and
//! no default bodies: adding a variant breaks every implementor until it
//! decides what to do with the new node. Visitors that only care about a
//! few variants call [`walk_operation`] from the rest.

use crate::operation::*;

pub trait OperationVisitor {
    fn visit_literal(&mut self, op: &LiteralOperation);
    fn visit_interpolation(&mut self, op: &InterpolationOperation);
    fn visit_object(&mut self, op: &ObjectOperation);
    fn visit_array(&mut self, op: &ArrayOperation);
    fn visit_resource_info(&mut self, op: &ResourceInfoOperation);
    fn visit_module_info(&mut self, op: &ModuleInfoOperation);
    fn visit_variable_access(&mut self, op: &VariableAccessOperation);
    fn visit_parameter_access(&mut self, op: &ParameterAccessOperation);
    fn visit_local_variable_access(&mut self, op: &LocalVariableAccessOperation);
    fn visit_property_access(&mut self, op: &PropertyAccessOperation);
    fn visit_array_access(&mut self, op: &ArrayAccessOperation);
    fn visit_conditional(&mut self, op: &ConditionalOperation);
    fn visit_function_call(&mut self, op: &FunctionCallOperation);
    fn visit_binary(&mut self, op: &BinaryOperation);
    fn visit_unary(&mut self, op: &UnaryOperation);
    fn visit_for(&mut self, op: &ForOperation);
}

impl Operation {
    /// Dispatches to the visitor method for this variant
    pub fn accept<V: OperationVisitor + ?Sized>(&self, visitor: &mut V) {
        match self {
            Operation::Literal(op) => visitor.visit_literal(op),
            Operation::Interpolation(op) => visitor.visit_interpolation(op),
            Operation::Object(op) => visitor.visit_object(op),
            Operation::Array(op) => visitor.visit_array(op),
            Operation::ResourceInfo(op) => visitor.visit_resource_info(op),
            Operation::ModuleInfo(op) => visitor.visit_module_info(op),
            Operation::VariableAccess(op) => visitor.visit_variable_access(op),
            Operation::ParameterAccess(op) => visitor.visit_parameter_access(op),
            Operation::LocalVariableAccess(op) => visitor.visit_local_variable_access(op),
            Operation::PropertyAccess(op) => visitor.visit_property_access(op),
            Operation::ArrayAccess(op) => visitor.visit_array_access(op),
            Operation::Conditional(op) => visitor.visit_conditional(op),
            Operation::FunctionCall(op) => visitor.visit_function_call(op),
            Operation::Binary(op) => visitor.visit_binary(op),
            Operation::Unary(op) => visitor.visit_unary(op),
            Operation::For(op) => visitor.visit_for(op),
        }
    }
}

/// Visits every child of `op`, explicit index operations included
pub fn walk_operation<V: OperationVisitor + ?Sized>(visitor: &mut V, op: &Operation) {
    walk_children(visitor, op.children());
}

pub fn walk_children<'a, V, I>(visitor: &mut V, children: I)
where
    V: OperationVisitor + ?Sized,
    I: IntoIterator<Item = &'a Operation>,
{
    for child in children {
        child.accept(visitor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_error::Span;
    use keel_semantic::{LiteralValue, SyntaxId};

    /// Counts literals and recurses everywhere else
    #[derive(Default)]
    struct LiteralCounter {
        literals: usize,
        calls: Vec<String>,
    }

    impl OperationVisitor for LiteralCounter {
        fn visit_literal(&mut self, _op: &LiteralOperation) {
            self.literals += 1;
        }
        fn visit_interpolation(&mut self, op: &InterpolationOperation) {
            walk_children(self, op.children());
        }
        fn visit_object(&mut self, op: &ObjectOperation) {
            walk_children(self, op.children());
        }
        fn visit_array(&mut self, op: &ArrayOperation) {
            walk_children(self, op.children());
        }
        fn visit_resource_info(&mut self, op: &ResourceInfoOperation) {
            walk_children(self, op.children());
        }
        fn visit_module_info(&mut self, op: &ModuleInfoOperation) {
            walk_children(self, op.children());
        }
        fn visit_variable_access(&mut self, op: &VariableAccessOperation) {
            walk_children(self, op.children());
        }
        fn visit_parameter_access(&mut self, _op: &ParameterAccessOperation) {}
        fn visit_local_variable_access(&mut self, _op: &LocalVariableAccessOperation) {}
        fn visit_property_access(&mut self, op: &PropertyAccessOperation) {
            walk_children(self, op.children());
        }
        fn visit_array_access(&mut self, op: &ArrayAccessOperation) {
            walk_children(self, op.children());
        }
        fn visit_conditional(&mut self, op: &ConditionalOperation) {
            walk_children(self, op.children());
        }
        fn visit_function_call(&mut self, op: &FunctionCallOperation) {
            self.calls.push(op.name.clone());
            walk_children(self, op.children());
        }
        fn visit_binary(&mut self, op: &BinaryOperation) {
            walk_children(self, op.children());
        }
        fn visit_unary(&mut self, op: &UnaryOperation) {
            walk_children(self, op.children());
        }
        fn visit_for(&mut self, op: &ForOperation) {
            walk_children(self, op.children());
        }
    }

    fn int(id: u32, value: i64) -> Operation {
        Operation::Literal(LiteralOperation {
            syntax: SyntaxId(id),
            span: Span::default(),
            value: LiteralValue::Int(value),
        })
    }

    #[test]
    fn test_accept_dispatches_and_walks() {
        let call = Operation::FunctionCall(FunctionCallOperation {
            syntax: SyntaxId(3),
            span: Span::default(),
            name: "range".to_string(),
            arguments: vec![int(1, 0), int(2, 3)],
        });
        let array = Operation::Array(ArrayOperation {
            syntax: SyntaxId(5),
            span: Span::default(),
            items: vec![call, int(4, 9)],
        });

        let mut counter = LiteralCounter::default();
        array.accept(&mut counter);
        assert_eq!(counter.literals, 3);
        assert_eq!(counter.calls, vec!["range"]);
    }
}
