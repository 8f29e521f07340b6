use cranedb_core::{QueryError, Schema, Value};

use crate::ast::{
    CreateIndexData, CreateTableData, CreateViewData, DeleteData, InsertData, ModifyData,
    QueryData, Statement,
};
use crate::lex::{Keyword, Lexer};
use crate::predicate::{Expression, Predicate, Term};

/// Recursive-descent parser for the dialect:
///
/// ```text
/// Query       := SELECT field_list FROM table_list [WHERE predicate]
/// UpdateCmd   := Insert | Delete | Modify | CreateCmd
/// Insert      := INSERT INTO id '(' field_list ')' VALUES '(' const_list ')'
/// Delete      := DELETE FROM id [WHERE predicate]
/// Modify      := UPDATE id SET field '=' expression [WHERE predicate]
/// CreateCmd   := CREATE (CreateTable | CreateView | CreateIndex)
/// field_def   := id (INT | VARCHAR '(' int ')')
/// predicate   := term (AND term)*
/// term        := expression '=' expression
/// expression  := id | int_const | string_const
/// ```
#[derive(Debug)]
pub struct Parser {
    lexer: Lexer,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self, QueryError> {
        Ok(Self {
            lexer: Lexer::new(input)?,
        })
    }

    /// Parse one full statement, rejecting trailing tokens.
    pub fn statement(&mut self) -> Result<Statement, QueryError> {
        let statement = if self.lexer.match_keyword(Keyword::Select) {
            Statement::Query(self.query()?)
        } else {
            self.update_cmd()?
        };

        self.lexer.expect_end()?;
        Ok(statement)
    }

    pub fn query(&mut self) -> Result<QueryData, QueryError> {
        self.lexer.eat_keyword(Keyword::Select)?;
        let fields = self.field_list()?;

        self.lexer.eat_keyword(Keyword::From)?;
        let tables = self.id_list()?;

        Ok(QueryData {
            fields,
            tables,
            predicate: self.opt_where()?,
        })
    }

    fn update_cmd(&mut self) -> Result<Statement, QueryError> {
        if self.lexer.match_keyword(Keyword::Insert) {
            Ok(Statement::Insert(self.insert()?))
        } else if self.lexer.match_keyword(Keyword::Delete) {
            Ok(Statement::Delete(self.delete()?))
        } else if self.lexer.match_keyword(Keyword::Update) {
            Ok(Statement::Modify(self.modify()?))
        } else if self.lexer.match_keyword(Keyword::Create) {
            self.create()
        } else {
            Err(QueryError::bad_syntax("expected a query or update command"))
        }
    }

    fn insert(&mut self) -> Result<InsertData, QueryError> {
        self.lexer.eat_keyword(Keyword::Insert)?;
        self.lexer.eat_keyword(Keyword::Into)?;
        let table = self.lexer.eat_id()?;

        self.lexer.eat_delim('(')?;
        let fields = self.field_list()?;
        self.lexer.eat_delim(')')?;

        self.lexer.eat_keyword(Keyword::Values)?;
        self.lexer.eat_delim('(')?;
        let values = self.const_list()?;
        self.lexer.eat_delim(')')?;

        Ok(InsertData {
            table,
            fields,
            values,
        })
    }

    fn delete(&mut self) -> Result<DeleteData, QueryError> {
        self.lexer.eat_keyword(Keyword::Delete)?;
        self.lexer.eat_keyword(Keyword::From)?;
        let table = self.lexer.eat_id()?;

        Ok(DeleteData {
            table,
            predicate: self.opt_where()?,
        })
    }

    fn modify(&mut self) -> Result<ModifyData, QueryError> {
        self.lexer.eat_keyword(Keyword::Update)?;
        let table = self.lexer.eat_id()?;

        self.lexer.eat_keyword(Keyword::Set)?;
        let field = self.field()?;
        self.lexer.eat_delim('=')?;
        let value = self.expression()?;

        Ok(ModifyData {
            table,
            field,
            value,
            predicate: self.opt_where()?,
        })
    }

    fn create(&mut self) -> Result<Statement, QueryError> {
        self.lexer.eat_keyword(Keyword::Create)?;

        if self.lexer.match_keyword(Keyword::Table) {
            Ok(Statement::CreateTable(self.create_table()?))
        } else if self.lexer.match_keyword(Keyword::View) {
            Ok(Statement::CreateView(self.create_view()?))
        } else if self.lexer.match_keyword(Keyword::Index) {
            Ok(Statement::CreateIndex(self.create_index()?))
        } else {
            Err(QueryError::bad_syntax("expected table, view, or index"))
        }
    }

    fn create_table(&mut self) -> Result<CreateTableData, QueryError> {
        self.lexer.eat_keyword(Keyword::Table)?;
        let table = self.lexer.eat_id()?;

        self.lexer.eat_delim('(')?;
        let schema = self.field_defs()?;
        self.lexer.eat_delim(')')?;

        Ok(CreateTableData { table, schema })
    }

    fn create_view(&mut self) -> Result<CreateViewData, QueryError> {
        self.lexer.eat_keyword(Keyword::View)?;
        let view = self.lexer.eat_id()?;
        self.lexer.eat_keyword(Keyword::As)?;

        Ok(CreateViewData {
            view,
            query: self.query()?,
        })
    }

    fn create_index(&mut self) -> Result<CreateIndexData, QueryError> {
        self.lexer.eat_keyword(Keyword::Index)?;
        let index = self.lexer.eat_id()?;

        self.lexer.eat_keyword(Keyword::On)?;
        let table = self.lexer.eat_id()?;

        self.lexer.eat_delim('(')?;
        let field = self.field()?;
        self.lexer.eat_delim(')')?;

        Ok(CreateIndexData {
            index,
            table,
            field,
        })
    }

    fn field_defs(&mut self) -> Result<Schema, QueryError> {
        let mut schema = Schema::new();
        self.field_def(&mut schema)?;

        while self.lexer.match_delim(',') {
            self.lexer.eat_delim(',')?;
            self.field_def(&mut schema)?;
        }

        Ok(schema)
    }

    fn field_def(&mut self, schema: &mut Schema) -> Result<(), QueryError> {
        let name = self.field()?;

        if self.lexer.match_keyword(Keyword::Int) {
            self.lexer.eat_keyword(Keyword::Int)?;
            schema.add_int_field(&name);
        } else {
            self.lexer.eat_keyword(Keyword::Varchar)?;
            self.lexer.eat_delim('(')?;
            let length = self.lexer.eat_int()?;
            self.lexer.eat_delim(')')?;

            if length < 1 {
                return Err(QueryError::bad_syntax(format!(
                    "varchar length must be positive, got {length}"
                )));
            }
            schema.add_string_field(&name, length as usize);
        }

        Ok(())
    }

    fn opt_where(&mut self) -> Result<Predicate, QueryError> {
        if !self.lexer.match_keyword(Keyword::Where) {
            return Ok(Predicate::default());
        }

        self.lexer.eat_keyword(Keyword::Where)?;
        self.predicate()
    }

    fn predicate(&mut self) -> Result<Predicate, QueryError> {
        let mut predicate = Predicate::new(self.term()?);

        while self.lexer.match_keyword(Keyword::And) {
            self.lexer.eat_keyword(Keyword::And)?;
            predicate.conjoin_with(Predicate::new(self.term()?));
        }

        Ok(predicate)
    }

    fn term(&mut self) -> Result<Term, QueryError> {
        let lhs = self.expression()?;
        self.lexer.eat_delim('=')?;
        let rhs = self.expression()?;

        Ok(Term::new(lhs, rhs))
    }

    fn expression(&mut self) -> Result<Expression, QueryError> {
        if self.lexer.match_id() {
            Ok(Expression::Field(self.field()?))
        } else {
            Ok(Expression::Const(self.constant()?))
        }
    }

    fn constant(&mut self) -> Result<Value, QueryError> {
        if self.lexer.match_string() {
            Ok(Value::Text(self.lexer.eat_string()?))
        } else {
            Ok(Value::Int(self.lexer.eat_int()?))
        }
    }

    fn field(&mut self) -> Result<String, QueryError> {
        self.lexer.eat_id()
    }

    fn field_list(&mut self) -> Result<Vec<String>, QueryError> {
        let mut fields = vec![self.field()?];

        while self.lexer.match_delim(',') {
            self.lexer.eat_delim(',')?;
            fields.push(self.field()?);
        }

        Ok(fields)
    }

    fn id_list(&mut self) -> Result<Vec<String>, QueryError> {
        let mut ids = vec![self.lexer.eat_id()?];

        while self.lexer.match_delim(',') {
            self.lexer.eat_delim(',')?;
            ids.push(self.lexer.eat_id()?);
        }

        Ok(ids)
    }

    fn const_list(&mut self) -> Result<Vec<Value>, QueryError> {
        let mut values = vec![self.constant()?];

        while self.lexer.match_delim(',') {
            self.lexer.eat_delim(',')?;
            values.push(self.constant()?);
        }

        Ok(values)
    }
}
