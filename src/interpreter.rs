//! Tree-walking evaluator.  Consumes the statement list plus the resolver's
//! distance table and executes for effect, maintaining the live environment
//! chain.
//!
//! Control flow out of a `return` statement travels on the same `Result`
//! rails as runtime faults but in its own [`Interrupt`] variant; the two are
//! matched explicitly everywhere (function-call boundary, top-level
//! `interpret`) and never folded together by a catch-all.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;
use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};

use log::{debug, info};
use thiserror::Error;

use crate::class::{Class, Instance};
use crate::environment::Environment;
use crate::error::{LoxError, Result};
use crate::expr::{Expr, ExprId, LiteralValue};
use crate::function::Function;
use crate::stmt::{Stmt, FunctionDecl};
use crate::token::{Token, TokenType};
use crate::value::Value;

/// Non-local transfer threaded through evaluation: either a genuine runtime
/// fault, or the `return` signal unwinding to the nearest call boundary.
#[derive(Debug, Error)]
pub enum Interrupt {
    /// Runtime fault - aborts the batch at the `interpret` boundary.
    #[error(transparent)]
    Fault(#[from] LoxError),

    /// `return` signal carrying the value; consumed by `Function::call`.
    #[error("return signal carrying {0}")]
    Return(Value),
}

/// Convenient alias for evaluation results.
pub type ExecResult<T> = std::result::Result<T, Interrupt>;

pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    /// The resolver's side table: expression identity → binding distance.
    /// Absence of an entry means "resolve dynamically as a global".
    locals: HashMap<ExprId, usize>,
    stdout: Rc<RefCell<dyn Write>>,
}

impl Interpreter {
    /// Creates a new Interpreter writing `print` output to `stdout`, and
    /// defines native functions such as `clock` in the global frame.
    pub fn new(stdout: Rc<RefCell<dyn Write>>) -> Self {
        info!("Initializing Interpreter");

        let globals = Rc::new(RefCell::new(Environment::new()));

        globals.borrow_mut().define(
            "clock",
            Value::NativeFunction {
                name: "clock".to_string(),
                arity: 0,
                func: |_args: &[Value]| {
                    let timestamp: f64 = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map_err(|e: SystemTimeError| format!("Clock error: {}", e))?
                        .as_secs_f64();
                    Ok(Value::Number(timestamp))
                },
            },
        );

        Self {
            environment: globals.clone(),
            globals,
            locals: HashMap::new(),
            stdout,
        }
    }

    /// Record a binding distance for a resolvable expression.  Called by the
    /// resolver while it walks the tree.
    pub fn resolve(&mut self, id: ExprId, depth: usize) {
        self.locals.insert(id, depth);
    }

    /// Interprets a list of statements (a "program").  A runtime fault aborts
    /// the remainder of the batch; effects of already-executed statements
    /// stay.
    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<()> {
        debug!("Interpreting {} statements", statements.len());

        for stmt in statements {
            match self.execute(stmt) {
                Ok(()) => {}

                Err(Interrupt::Fault(e)) => return Err(e),

                // The resolver rejects top-level `return`; reaching here means
                // interpret ran without a matching resolver pass.
                Err(Interrupt::Return(_)) => {
                    return Err(LoxError::runtime(0, "Can't return from top-level code."));
                }
            }
        }

        info!("Interpretation completed successfully");

        Ok(())
    }

    /// Executes a single statement.
    fn execute(&mut self, stmt: &Stmt) -> ExecResult<()> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
                Ok(())
            }

            Stmt::Print(expr) => {
                let value = self.evaluate(expr)?;
                writeln!(self.stdout.borrow_mut(), "{}", value).map_err(LoxError::from)?;
                Ok(())
            }

            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };

                self.environment.borrow_mut().define(&name.lexeme, value);
                Ok(())
            }

            Stmt::Block(statements) => {
                let environment = Rc::new(RefCell::new(Environment::with_enclosing(
                    self.environment.clone(),
                )));

                self.execute_block(statements, environment)
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if is_truthy(&self.evaluate(condition)?) {
                    self.execute(then_branch)
                } else if let Some(else_stmt) = else_branch {
                    self.execute(else_stmt)
                } else {
                    Ok(())
                }
            }

            Stmt::While { condition, body } => {
                while is_truthy(&self.evaluate(condition)?) {
                    self.execute(body)?;
                }
                Ok(())
            }

            Stmt::Function(declaration) => {
                debug!("Defining function '{}'", declaration.name.lexeme);

                // The closure captures the environment active *now*, at the
                // declaration site.
                let function = Function::new(declaration, self.environment.clone(), false);

                self.environment
                    .borrow_mut()
                    .define(&declaration.name.lexeme, Value::Function(Rc::new(function)));

                Ok(())
            }

            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };

                Err(Interrupt::Return(value))
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.execute_class(name, superclass.as_ref(), methods),
        }
    }

    /// Class declaration: resolve the superclass, bind the name early (so
    /// methods may reference the class recursively), capture `super` in an
    /// intermediate frame for the method closures, then assign the finished
    /// class value.
    fn execute_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[FunctionDecl],
    ) -> ExecResult<()> {
        debug!("Declaring class '{}'", name.lexeme);

        let superclass_value = match superclass {
            Some(expr) => match self.evaluate(expr)? {
                Value::Class(class) => Some(class),
                _ => {
                    let line = match expr {
                        Expr::Variable { name, .. } => name.line,
                        _ => name.line,
                    };

                    return Err(LoxError::runtime(line, "Superclass must be a class.").into());
                }
            },
            None => None,
        };

        self.environment
            .borrow_mut()
            .define(&name.lexeme, Value::Nil);

        let previous = self.environment.clone();

        if let Some(superclass) = &superclass_value {
            let environment = Rc::new(RefCell::new(Environment::with_enclosing(
                self.environment.clone(),
            )));

            environment
                .borrow_mut()
                .define("super", Value::Class(superclass.clone()));

            self.environment = environment;
        }

        let mut method_table: HashMap<String, Rc<Function>> = HashMap::new();

        for method in methods {
            let is_initializer = method.name.lexeme == "init";
            let function = Function::new(method, self.environment.clone(), is_initializer);
            method_table.insert(method.name.lexeme.clone(), Rc::new(function));
        }

        self.environment = previous;

        let class = Class::new(name.lexeme.clone(), superclass_value, method_table);

        self.environment
            .borrow_mut()
            .assign(&name.lexeme, Value::Class(Rc::new(class)), name.line)?;

        Ok(())
    }

    /// Execute `statements` inside `environment`, restoring the previous
    /// environment unconditionally - on normal completion, on a fault, and on
    /// a return signal.
    pub(crate) fn execute_block(
        &mut self,
        statements: &[Stmt],
        environment: Rc<RefCell<Environment>>,
    ) -> ExecResult<()> {
        let previous = std::mem::replace(&mut self.environment, environment);

        let mut result = Ok(());

        for statement in statements {
            result = self.execute(statement);

            if result.is_err() {
                break;
            }
        }

        self.environment = previous;

        result
    }

    /// Evaluates an expression and returns a Value.
    fn evaluate(&mut self, expr: &Expr) -> ExecResult<Value> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                LiteralValue::Number(n) => Value::Number(*n),
                LiteralValue::Str(s) => Value::String(s.clone()),
                LiteralValue::True => Value::Bool(true),
                LiteralValue::False => Value::Bool(false),
                LiteralValue::Nil => Value::Nil,
            }),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Unary { operator, right } => self.evaluate_unary(operator, right),

            Expr::Binary {
                left,
                operator,
                right,
            } => self.evaluate_binary(left, operator, right),

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                // The operand's actual value comes back, not a coerced bool.
                let left_value = self.evaluate(left)?;

                match operator.token_type {
                    TokenType::OR if is_truthy(&left_value) => Ok(left_value),
                    TokenType::AND if !is_truthy(&left_value) => Ok(left_value),
                    _ => self.evaluate(right),
                }
            }

            Expr::Variable { id, name } => Ok(self.lookup_variable(name, *id)?),

            Expr::Assign { id, name, value } => {
                let value = self.evaluate(value)?;

                if let Some(distance) = self.locals.get(id) {
                    Environment::assign_at(
                        &self.environment,
                        *distance,
                        &name.lexeme,
                        value.clone(),
                    );
                } else {
                    self.globals
                        .borrow_mut()
                        .assign(&name.lexeme, value.clone(), name.line)?;
                }

                Ok(value)
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee_value = self.evaluate(callee)?;

                let mut argument_values = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    argument_values.push(self.evaluate(argument)?);
                }

                self.invoke_callable(&callee_value, paren, &argument_values)
            }

            Expr::Get { object, name } => match self.evaluate(object)? {
                Value::Instance(instance) => Ok(Instance::get(&instance, name)?),
                _ => Err(LoxError::runtime(name.line, "Only instances have properties.").into()),
            },

            Expr::Set {
                object,
                name,
                value,
            } => match self.evaluate(object)? {
                Value::Instance(instance) => {
                    let value = self.evaluate(value)?;
                    instance.borrow_mut().set(name, value.clone());
                    Ok(value)
                }
                _ => Err(LoxError::runtime(name.line, "Only instances have fields.").into()),
            },

            Expr::This { id, keyword } => Ok(self.lookup_variable(keyword, *id)?),

            Expr::Super {
                id,
                keyword,
                method,
            } => self.evaluate_super(*id, keyword, method),

            Expr::Array { elements } => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.evaluate(element)?);
                }

                Ok(Value::Array(Rc::new(RefCell::new(values))))
            }

            Expr::GetSubscript {
                array,
                bracket,
                index,
            } => {
                let target = self.evaluate(array)?;
                let index_value = self.evaluate(index)?;

                match target {
                    Value::Array(elements) => {
                        let elements = elements.borrow();
                        let i = subscript_index(&index_value, bracket, elements.len())?;
                        Ok(elements[i].clone())
                    }
                    _ => {
                        Err(LoxError::runtime(bracket.line, "Only arrays can be subscripted.")
                            .into())
                    }
                }
            }

            Expr::SetSubscript {
                array,
                bracket,
                index,
                value,
            } => {
                let target = self.evaluate(array)?;
                let index_value = self.evaluate(index)?;
                let value = self.evaluate(value)?;

                match target {
                    Value::Array(elements) => {
                        let mut elements = elements.borrow_mut();
                        let i = subscript_index(&index_value, bracket, elements.len())?;
                        elements[i] = value.clone();
                        Ok(value)
                    }
                    _ => {
                        Err(LoxError::runtime(bracket.line, "Only arrays can be subscripted.")
                            .into())
                    }
                }
            }
        }
    }

    /// Evaluates a unary expression.
    fn evaluate_unary(&mut self, operator: &Token, right: &Expr) -> ExecResult<Value> {
        let right_value = self.evaluate(right)?;

        match operator.token_type {
            TokenType::MINUS => {
                if let Value::Number(n) = right_value {
                    Ok(Value::Number(-n))
                } else {
                    Err(LoxError::runtime(operator.line, "Operand must be a number.").into())
                }
            }

            TokenType::BANG => Ok(Value::Bool(!is_truthy(&right_value))),

            _ => Err(LoxError::runtime(operator.line, "Invalid unary operator.").into()),
        }
    }

    /// Evaluates a binary expression.
    fn evaluate_binary(&mut self, left: &Expr, operator: &Token, right: &Expr) -> ExecResult<Value> {
        let left_value = self.evaluate(left)?;
        let right_value = self.evaluate(right)?;

        match operator.token_type {
            TokenType::PLUS => match (left_value, right_value) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
                _ => Err(LoxError::runtime(
                    operator.line,
                    "Operands must be two numbers or two strings.",
                )
                .into()),
            },

            TokenType::MINUS => match (left_value, right_value) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a - b)),
                _ => Err(numbers_error(operator)),
            },

            TokenType::STAR => match (left_value, right_value) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a * b)),
                _ => Err(numbers_error(operator)),
            },

            // Division follows IEEE-754; x / 0 yields an infinity.
            TokenType::SLASH => match (left_value, right_value) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a / b)),
                _ => Err(numbers_error(operator)),
            },

            TokenType::GREATER => match (left_value, right_value) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a > b)),
                _ => Err(numbers_error(operator)),
            },

            TokenType::GREATER_EQUAL => match (left_value, right_value) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a >= b)),
                _ => Err(numbers_error(operator)),
            },

            TokenType::LESS => match (left_value, right_value) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a < b)),
                _ => Err(numbers_error(operator)),
            },

            TokenType::LESS_EQUAL => match (left_value, right_value) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a <= b)),
                _ => Err(numbers_error(operator)),
            },

            TokenType::EQUAL_EQUAL => Ok(Value::Bool(is_equal(&left_value, &right_value))),

            TokenType::BANG_EQUAL => Ok(Value::Bool(!is_equal(&left_value, &right_value))),

            _ => Err(LoxError::runtime(operator.line, "Invalid binary operator.").into()),
        }
    }

    /// `super.method` dispatch: the method is looked up on the statically
    /// known superclass (through the resolver's distances), while `this`
    /// stays bound to the receiving instance one frame closer in.
    fn evaluate_super(&mut self, id: ExprId, keyword: &Token, method: &Token) -> ExecResult<Value> {
        let distance = *self.locals.get(&id).ok_or_else(|| {
            LoxError::runtime(keyword.line, "Can't use 'super' outside of a class.")
        })?;

        let superclass = match Environment::get_at(&self.environment, distance, "super") {
            Value::Class(class) => class,
            _ => unreachable!("'super' bound to a non-class value"),
        };

        let object = match Environment::get_at(&self.environment, distance - 1, "this") {
            Value::Instance(instance) => instance,
            _ => unreachable!("'this' bound to a non-instance value"),
        };

        let found = superclass.find_method(&method.lexeme).ok_or_else(|| {
            LoxError::runtime(
                method.line,
                format!("Undefined property '{}'.", method.lexeme),
            )
        })?;

        Ok(Value::Function(Rc::new(found.bind(object))))
    }

    /// Look a variable up: at its resolved fixed distance when the resolver
    /// recorded one, in the globals otherwise.
    fn lookup_variable(&self, name: &Token, id: ExprId) -> Result<Value> {
        if let Some(distance) = self.locals.get(&id) {
            Ok(Environment::get_at(
                &self.environment,
                *distance,
                &name.lexeme,
            ))
        } else {
            self.globals.borrow().get(&name.lexeme, name.line)
        }
    }

    /// Invokes a callable value (native function, declared function, or
    /// class-as-constructor).
    fn invoke_callable(
        &mut self,
        callee: &Value,
        paren: &Token,
        arguments: &[Value],
    ) -> ExecResult<Value> {
        match callee {
            Value::NativeFunction { name, arity, func } => {
                debug!("Calling native function '{}'", name);

                check_arity(*arity, arguments.len(), paren)?;

                let result =
                    func(arguments).map_err(|message| LoxError::runtime(paren.line, message))?;

                Ok(result)
            }

            Value::Function(function) => {
                check_arity(function.arity(), arguments.len(), paren)?;

                function.call(self, arguments)
            }

            Value::Class(class) => {
                debug!("Constructing instance of '{}'", class.name);

                check_arity(class.arity(), arguments.len(), paren)?;

                let instance = Rc::new(RefCell::new(Instance::new(class.clone())));

                // The initializer's return value is discarded: construction
                // always yields the instance.
                if let Some(initializer) = class.find_method("init") {
                    initializer.bind(instance.clone()).call(self, arguments)?;
                }

                Ok(Value::Instance(instance))
            }

            _ => {
                Err(LoxError::runtime(paren.line, "Can only call functions and classes.").into())
            }
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Rc::new(RefCell::new(std::io::stdout())))
    }
}

fn check_arity(expected: usize, got: usize, paren: &Token) -> ExecResult<()> {
    if got != expected {
        return Err(LoxError::runtime(
            paren.line,
            format!("Expected {} arguments but got {}.", expected, got),
        )
        .into());
    }

    Ok(())
}

fn numbers_error(operator: &Token) -> Interrupt {
    LoxError::runtime(operator.line, "Operands must be numbers.").into()
}

/// Validate a subscript index: a non-negative whole number inside the bounds.
fn subscript_index(value: &Value, bracket: &Token, len: usize) -> Result<usize> {
    match value {
        Value::Number(n) if n.fract() == 0.0 => {
            if *n >= 0.0 && (*n as usize) < len {
                Ok(*n as usize)
            } else {
                Err(LoxError::runtime(bracket.line, "Array index out of range."))
            }
        }

        _ => Err(LoxError::runtime(
            bracket.line,
            "Array index must be a whole number.",
        )),
    }
}

/// nil and false are falsy; every other value (including 0 and "") is truthy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Nil => false,
        Value::Bool(b) => *b,
        _ => true,
    }
}

/// Equality never raises: primitives compare by value, compound values by
/// identity, nil only equals nil.
fn is_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Nil, Value::Nil) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::NativeFunction { name: a, .. }, Value::NativeFunction { name: b, .. }) => a == b,
        (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
        (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
        (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
        (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}
