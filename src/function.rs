//! Declared-function closures.  A `Function` pairs the declaration with the
//! environment that was active when the declaration executed, which is what
//! lets two closures from the same declaration share (or not share) mutable
//! state with their defining scope.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::class::Instance;
use crate::environment::Environment;
use crate::interpreter::{ExecResult, Interpreter, Interrupt};
use crate::stmt::FunctionDecl;
use crate::value::Value;

pub struct Function {
    declaration: Rc<FunctionDecl>,
    closure: Rc<RefCell<Environment>>,
    is_initializer: bool,
}

impl Function {
    /// Build a closure over the environment active at the declaration site.
    pub fn new(
        declaration: &FunctionDecl,
        closure: Rc<RefCell<Environment>>,
        is_initializer: bool,
    ) -> Self {
        Self {
            declaration: Rc::new(declaration.clone()),
            closure,
            is_initializer,
        }
    }

    pub fn name(&self) -> &str {
        &self.declaration.name.lexeme
    }

    pub fn arity(&self) -> usize {
        self.declaration.params.len()
    }

    /// Produce a copy of this function whose closure has `this` bound to
    /// `instance` - the fresh frame holds nothing else.
    pub fn bind(&self, instance: Rc<RefCell<Instance>>) -> Function {
        let environment = Rc::new(RefCell::new(Environment::with_enclosing(
            self.closure.clone(),
        )));

        environment
            .borrow_mut()
            .define("this", Value::Instance(instance));

        Function {
            declaration: self.declaration.clone(),
            closure: environment,
            is_initializer: self.is_initializer,
        }
    }

    /// Invoke the function.  The call frame is a child of the *captured*
    /// environment, not of the caller's current one - lexical scoping.
    /// A `Return` interrupt terminates the body; initializers always yield
    /// the instance regardless of how the body exited.
    pub fn call(&self, interpreter: &mut Interpreter, arguments: &[Value]) -> ExecResult<Value> {
        debug!("Calling function '{}'", self.name());

        let environment = Rc::new(RefCell::new(Environment::with_enclosing(
            self.closure.clone(),
        )));

        for (param, argument) in self.declaration.params.iter().zip(arguments) {
            environment
                .borrow_mut()
                .define(&param.lexeme, argument.clone());
        }

        match interpreter.execute_block(&self.declaration.body, environment) {
            Ok(()) => {}

            Err(Interrupt::Return(value)) => {
                if self.is_initializer {
                    return Ok(Environment::get_at(&self.closure, 0, "this"));
                }

                return Ok(value);
            }

            Err(fault) => return Err(fault),
        }

        if self.is_initializer {
            return Ok(Environment::get_at(&self.closure, 0, "this"));
        }

        Ok(Value::Nil)
    }
}

impl fmt::Debug for Function {
    // Shallow on purpose: the closure chain can reference this function back.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.declaration.name.lexeme)
            .field("arity", &self.declaration.params.len())
            .field("is_initializer", &self.is_initializer)
            .finish()
    }
}
