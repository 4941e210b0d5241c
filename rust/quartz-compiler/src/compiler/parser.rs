//! Recursive-descent parser with a precedence-climbing expression engine.
//!
//! Statements parse by recursive descent; expressions lower directly into
//! flat RPN unit streams (`Expr`). Short-circuit operators (`&&`, `||`,
//! `?:`, `??`) nest their right-hand sides as sub-streams inside branch or
//! coalescence units so that the evaluator runs exactly one side. The parser
//! returns the first error; there is no recovery.

use crate::compiler::ast::*;
use crate::compiler::errors::{ParseError, ParseErrorCode};
use crate::compiler::tokens::{Keyword, Punct, Span, Token, TokenKind};
use quartz_core::{is_reserved_name, Value};

/// Binding power of the lowest precedence tier: ternary and every
/// assignment form. These are right-associative.
const BP_ASSIGN: u8 = 2;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file: String,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, filename: &str) -> Self {
        Parser {
            tokens,
            pos: 0,
            file: filename.to_string(),
        }
    }

    /// Parse the whole token stream as a statement list.
    pub fn parse_program(mut self) -> Result<Block, ParseError> {
        let mut stmts = Vec::new();
        while self.current().is_some() {
            stmts.push(self.parse_statement()?);
        }
        Ok(Block::new(stmts))
    }

    // ── Cursor helpers ──────────────────────────────────────────────

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn span_here(&self) -> Span {
        match self.tokens.get(self.pos).or_else(|| self.tokens.last()) {
            Some(token) => token.span,
            None => Span::new(1, 0, 0),
        }
    }

    fn line_here(&self) -> u32 {
        self.span_here().line.max(1)
    }

    fn loc_here(&self) -> SourceLocation {
        SourceLocation::new(self.file.clone(), self.line_here())
    }

    fn error(&self, code: ParseErrorCode) -> ParseError {
        let span = self.span_here();
        ParseError::new(span.line.max(1), span.offset, span.length, code)
    }

    fn error_at(&self, span: Span, code: ParseErrorCode) -> ParseError {
        ParseError::new(span.line.max(1), span.offset, span.length, code)
    }

    fn at_punct(&self, punct: Punct) -> bool {
        matches!(self.current(), Some(Token { kind: TokenKind::Punct(p), .. }) if *p == punct)
    }

    fn at_keyword(&self, keyword: Keyword) -> bool {
        matches!(self.current(), Some(Token { kind: TokenKind::Keyword(k), .. }) if *k == keyword)
    }

    fn eat_punct(&mut self, punct: Punct) -> bool {
        if self.at_punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: Punct, code: ParseErrorCode) -> Result<(), ParseError> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.error(code))
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Span), ParseError> {
        match self.current() {
            Some(Token { kind: TokenKind::Ident(name), span }) => {
                let result = (name.clone(), *span);
                self.pos += 1;
                Ok(result)
            }
            _ => Err(self.error(ParseErrorCode::IdentifierExpected)),
        }
    }

    /// An identifier a user program is allowed to introduce.
    fn expect_declarable_ident(&mut self) -> Result<String, ParseError> {
        let (name, span) = self.expect_ident()?;
        if is_reserved_name(&name) {
            return Err(self.error_at(span, ParseErrorCode::ReservedIdentifier));
        }
        Ok(name)
    }

    // ── Statements ──────────────────────────────────────────────────

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        let Some(token) = self.current() else {
            return Err(self.error(ParseErrorCode::StatementExpected));
        };
        match token.kind.clone() {
            TokenKind::Punct(Punct::BraceOp) => Ok(Stmt::Block(self.parse_braced_block()?)),
            TokenKind::Punct(Punct::Semicolon) => {
                self.pos += 1;
                Ok(Stmt::Block(Block::default()))
            }
            TokenKind::Keyword(Keyword::Var) => self.parse_var_def(false),
            TokenKind::Keyword(Keyword::Const) => self.parse_var_def(true),
            TokenKind::Keyword(Keyword::Func)
                if matches!(
                    self.tokens.get(self.pos + 1),
                    Some(Token { kind: TokenKind::Ident(_), .. })
                ) =>
            {
                self.parse_func_def()
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::Switch) => self.parse_switch(),
            TokenKind::Keyword(Keyword::Do) => self.parse_do_while(),
            TokenKind::Keyword(Keyword::While) => self.parse_while(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Keyword(Keyword::Try) => self.parse_try(),
            TokenKind::Keyword(Keyword::Defer) => self.parse_defer(),
            TokenKind::Keyword(Keyword::Break) => self.parse_break(),
            TokenKind::Keyword(Keyword::Continue) => self.parse_continue(),
            TokenKind::Keyword(Keyword::Throw) => self.parse_throw(),
            TokenKind::Keyword(Keyword::Return) => self.parse_return(),
            TokenKind::Keyword(Keyword::Assert) => self.parse_assert(),
            _ => {
                let expr = self.parse_expression()?;
                self.expect_punct(Punct::Semicolon, ParseErrorCode::SemicolonExpected)?;
                Ok(Stmt::Expression { expr })
            }
        }
    }

    fn parse_braced_block(&mut self) -> Result<Block, ParseError> {
        self.expect_punct(Punct::BraceOp, ParseErrorCode::OpenBraceExpected)?;
        let mut stmts = Vec::new();
        loop {
            if self.eat_punct(Punct::BraceCl) {
                return Ok(Block::new(stmts));
            }
            if self.current().is_none() {
                return Err(self.error(ParseErrorCode::CloseBraceOrStatementExpected));
            }
            stmts.push(self.parse_statement()?);
        }
    }

    /// A loop or branch body: either a braced block or a single statement
    /// wrapped into one.
    fn parse_statement_as_block(&mut self) -> Result<Block, ParseError> {
        if self.at_punct(Punct::BraceOp) {
            self.parse_braced_block()
        } else {
            Ok(Block::new(vec![self.parse_statement()?]))
        }
    }

    fn parse_var_def(&mut self, immutable: bool) -> Result<Stmt, ParseError> {
        let loc = self.loc_here();
        self.pos += 1; // var | const
        let mut decls = Vec::new();
        loop {
            let name = self.expect_declarable_ident()?;
            let init = if self.eat_punct(Punct::Assign) {
                self.parse_expression()?
            } else if immutable {
                // A constant must be initialized.
                return Err(self.error(ParseErrorCode::EqualsSignExpected));
            } else {
                vec![Xunit::Literal { value: Value::Null }]
            };
            decls.push(VarDecl { name, init });
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::Semicolon, ParseErrorCode::SemicolonExpected)?;
        Ok(Stmt::VarDef {
            decls,
            immutable,
            loc,
        })
    }

    fn parse_func_def(&mut self) -> Result<Stmt, ParseError> {
        let loc = self.loc_here();
        self.pos += 1; // func
        let name = self.expect_declarable_ident()?;
        let params = self.parse_param_list()?;
        let body = self.parse_braced_block()?;
        let header = FnHeader {
            loc,
            name: name.clone(),
            params,
        };
        Ok(Stmt::FuncDef { name, header, body })
    }

    fn parse_param_list(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect_punct(Punct::ParenOp, ParseErrorCode::OpenParenthesisExpected)?;
        let mut params: Vec<String> = Vec::new();
        if self.eat_punct(Punct::ParenCl) {
            return Ok(params);
        }
        loop {
            if self.at_punct(Punct::Dot) {
                // `...` arrives as three dot tokens; it must close the list.
                let span = self.span_here();
                if self.eat_punct(Punct::Dot) && self.eat_punct(Punct::Dot) && self.eat_punct(Punct::Dot)
                {
                    params.push("...".to_string());
                    self.expect_punct(
                        Punct::ParenCl,
                        ParseErrorCode::CloseParenthesisExpected,
                    )?;
                    return Ok(params);
                }
                return Err(self.error_at(span, ParseErrorCode::CloseParenthesisOrParameterExpected));
            }
            let (name, span) = self.expect_ident()?;
            if is_reserved_name(&name) {
                return Err(self.error_at(span, ParseErrorCode::ReservedIdentifier));
            }
            if params.iter().any(|p| *p == name) {
                return Err(self.error_at(span, ParseErrorCode::DuplicateParameterName));
            }
            params.push(name);
            if self.eat_punct(Punct::Comma) {
                continue;
            }
            self.expect_punct(
                Punct::ParenCl,
                ParseErrorCode::CloseParenthesisOrParameterExpected,
            )?;
            return Ok(params);
        }
    }

    /// `if [!] ( cond ) body [else body]`
    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.pos += 1;
        let negate = self.eat_punct(Punct::NotL);
        self.expect_punct(Punct::ParenOp, ParseErrorCode::OpenParenthesisExpected)?;
        let cond = self.parse_expression()?;
        self.expect_punct(Punct::ParenCl, ParseErrorCode::CloseParenthesisExpected)?;
        let branch_true = self.parse_statement_as_block()?;
        let branch_false = if self.eat_keyword(Keyword::Else) {
            self.parse_statement_as_block()?
        } else {
            Block::default()
        };
        Ok(Stmt::If {
            negate,
            cond,
            branch_true,
            branch_false,
        })
    }

    fn parse_switch(&mut self) -> Result<Stmt, ParseError> {
        self.pos += 1;
        self.expect_punct(Punct::ParenOp, ParseErrorCode::OpenParenthesisExpected)?;
        let ctrl = self.parse_expression()?;
        self.expect_punct(Punct::ParenCl, ParseErrorCode::CloseParenthesisExpected)?;
        self.expect_punct(Punct::BraceOp, ParseErrorCode::OpenBraceExpected)?;
        let mut clauses: Vec<SwitchClause> = Vec::new();
        let mut seen_default = false;
        loop {
            if self.eat_punct(Punct::BraceCl) {
                return Ok(Stmt::Switch { ctrl, clauses });
            }
            let label = if self.eat_keyword(Keyword::Case) {
                let expr = self.parse_expression()?;
                self.expect_punct(Punct::Colon, ParseErrorCode::ColonExpected)?;
                Some(expr)
            } else if self.at_keyword(Keyword::Default) {
                if seen_default {
                    return Err(self.error(ParseErrorCode::CloseBraceOrSwitchClauseExpected));
                }
                seen_default = true;
                self.pos += 1;
                self.expect_punct(Punct::Colon, ParseErrorCode::ColonExpected)?;
                None
            } else {
                return Err(self.error(ParseErrorCode::CloseBraceOrSwitchClauseExpected));
            };
            let mut body = Vec::new();
            while !(self.at_keyword(Keyword::Case)
                || self.at_keyword(Keyword::Default)
                || self.at_punct(Punct::BraceCl))
            {
                if self.current().is_none() {
                    return Err(self.error(ParseErrorCode::CloseBraceOrSwitchClauseExpected));
                }
                body.push(self.parse_statement()?);
            }
            clauses.push(SwitchClause { label, body });
        }
    }

    /// `do body while [!] ( cond ) ;`
    fn parse_do_while(&mut self) -> Result<Stmt, ParseError> {
        self.pos += 1;
        let body = self.parse_statement_as_block()?;
        if !self.eat_keyword(Keyword::While) {
            return Err(self.error(ParseErrorCode::KeywordWhileExpected));
        }
        let negate = self.eat_punct(Punct::NotL);
        self.expect_punct(Punct::ParenOp, ParseErrorCode::OpenParenthesisExpected)?;
        let cond = self.parse_expression()?;
        self.expect_punct(Punct::ParenCl, ParseErrorCode::CloseParenthesisExpected)?;
        self.expect_punct(Punct::Semicolon, ParseErrorCode::SemicolonExpected)?;
        Ok(Stmt::DoWhile { body, negate, cond })
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        self.pos += 1;
        let negate = self.eat_punct(Punct::NotL);
        self.expect_punct(Punct::ParenOp, ParseErrorCode::OpenParenthesisExpected)?;
        let cond = self.parse_expression()?;
        self.expect_punct(Punct::ParenCl, ParseErrorCode::CloseParenthesisExpected)?;
        let body = self.parse_statement_as_block()?;
        Ok(Stmt::While { negate, cond, body })
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        self.pos += 1;
        if self.eat_keyword(Keyword::Each) {
            self.expect_punct(Punct::ParenOp, ParseErrorCode::OpenParenthesisExpected)?;
            let key_name = self.expect_declarable_ident()?;
            self.expect_punct(Punct::Comma, ParseErrorCode::CommaExpected)?;
            let value_name = self.expect_declarable_ident()?;
            self.expect_punct(Punct::Colon, ParseErrorCode::ColonExpected)?;
            let range = self.parse_expression()?;
            self.expect_punct(Punct::ParenCl, ParseErrorCode::CloseParenthesisExpected)?;
            let body = self.parse_statement_as_block()?;
            return Ok(Stmt::ForEach {
                key_name,
                value_name,
                range,
                body,
            });
        }
        self.expect_punct(Punct::ParenOp, ParseErrorCode::OpenParenthesisExpected)?;
        let init = if self.eat_punct(Punct::Semicolon) {
            None
        } else if self.at_keyword(Keyword::Var) || self.at_keyword(Keyword::Const) {
            let immutable = self.at_keyword(Keyword::Const);
            Some(Box::new(self.parse_var_def(immutable)?))
        } else if self.current().is_some() && !self.at_punct(Punct::ParenCl) {
            let expr = self.parse_expression()?;
            self.expect_punct(Punct::Semicolon, ParseErrorCode::SemicolonExpected)?;
            Some(Box::new(Stmt::Expression { expr }))
        } else {
            return Err(self.error(ParseErrorCode::ForStatementInitializerExpected));
        };
        let cond = if self.at_punct(Punct::Semicolon) {
            Vec::new()
        } else {
            self.parse_expression()?
        };
        self.expect_punct(Punct::Semicolon, ParseErrorCode::SemicolonExpected)?;
        let step = if self.at_punct(Punct::ParenCl) {
            Vec::new()
        } else {
            self.parse_expression()?
        };
        self.expect_punct(Punct::ParenCl, ParseErrorCode::CloseParenthesisExpected)?;
        let body = self.parse_statement_as_block()?;
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
        })
    }

    fn parse_try(&mut self) -> Result<Stmt, ParseError> {
        self.pos += 1;
        let body = self.parse_statement_as_block()?;
        if !self.eat_keyword(Keyword::Catch) {
            return Err(self.error(ParseErrorCode::KeywordCatchExpected));
        }
        self.expect_punct(Punct::ParenOp, ParseErrorCode::OpenParenthesisExpected)?;
        let except_name = self.expect_declarable_ident()?;
        self.expect_punct(Punct::ParenCl, ParseErrorCode::CloseParenthesisExpected)?;
        let handler = self.parse_statement_as_block()?;
        Ok(Stmt::Try {
            body,
            except_name,
            handler,
        })
    }

    fn parse_defer(&mut self) -> Result<Stmt, ParseError> {
        let loc = self.loc_here();
        self.pos += 1;
        let expr = self.parse_expression()?;
        self.expect_punct(Punct::Semicolon, ParseErrorCode::SemicolonExpected)?;
        Ok(Stmt::Defer { expr, loc })
    }

    fn parse_break(&mut self) -> Result<Stmt, ParseError> {
        self.pos += 1;
        let target = if self.eat_keyword(Keyword::Switch) {
            Target::Switch
        } else if self.eat_keyword(Keyword::While) {
            Target::While
        } else if self.eat_keyword(Keyword::For) {
            Target::For
        } else {
            Target::Unspec
        };
        self.expect_punct(Punct::Semicolon, ParseErrorCode::SemicolonExpected)?;
        Ok(Stmt::Break { target })
    }

    fn parse_continue(&mut self) -> Result<Stmt, ParseError> {
        self.pos += 1;
        let target = if self.eat_keyword(Keyword::While) {
            Target::While
        } else if self.eat_keyword(Keyword::For) {
            Target::For
        } else {
            Target::Unspec
        };
        self.expect_punct(Punct::Semicolon, ParseErrorCode::SemicolonExpected)?;
        Ok(Stmt::Continue { target })
    }

    fn parse_throw(&mut self) -> Result<Stmt, ParseError> {
        let loc = self.loc_here();
        self.pos += 1;
        let expr = self.parse_expression()?;
        self.expect_punct(Punct::Semicolon, ParseErrorCode::SemicolonExpected)?;
        Ok(Stmt::Throw { expr, loc })
    }

    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        self.pos += 1;
        let by_ref = self.eat_punct(Punct::AndB);
        let expr = if self.at_punct(Punct::Semicolon) {
            vec![Xunit::Literal { value: Value::Null }]
        } else {
            self.parse_expression()?
        };
        self.expect_punct(Punct::Semicolon, ParseErrorCode::SemicolonExpected)?;
        Ok(Stmt::Return { by_ref, expr })
    }

    /// `assert [!] expr [: "message"] ;`
    fn parse_assert(&mut self) -> Result<Stmt, ParseError> {
        let loc = self.loc_here();
        self.pos += 1;
        let negate = self.eat_punct(Punct::NotL);
        let expr = self.parse_expression()?;
        let message = if self.eat_punct(Punct::Colon) {
            match self.advance() {
                Some(Token { kind: TokenKind::StrLit(text), .. }) => Some(text.clone()),
                _ => return Err(self.error(ParseErrorCode::StringLiteralExpected)),
            }
        } else {
            None
        };
        self.expect_punct(Punct::Semicolon, ParseErrorCode::SemicolonExpected)?;
        Ok(Stmt::Assert {
            negate,
            expr,
            message,
            loc,
        })
    }

    // ── Expressions ─────────────────────────────────────────────────

    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        let mut units = Expr::new();
        self.parse_infix(&mut units, 0)?;
        Ok(units)
    }

    /// Precedence-climbing loop. `units` already holds the left operand when
    /// an operator is considered.
    fn parse_infix(&mut self, units: &mut Expr, min_bp: u8) -> Result<(), ParseError> {
        self.parse_unary(units)?;
        loop {
            let Some(token) = self.current() else {
                return Ok(());
            };
            match token.kind.clone() {
                // Plain left-associative binary operators.
                TokenKind::Punct(punct) => {
                    if let Some((bp, op)) = binary_op(punct) {
                        if bp < min_bp {
                            return Ok(());
                        }
                        self.pos += 1;
                        self.parse_infix(units, bp + 1)?;
                        units.push(Xunit::OperatorRpn { op, assign: false });
                        continue;
                    }
                    if let Some(op) = compound_assign_op(punct) {
                        if BP_ASSIGN < min_bp {
                            return Ok(());
                        }
                        self.pos += 1;
                        self.parse_infix(units, BP_ASSIGN)?;
                        units.push(Xunit::OperatorRpn { op, assign: true });
                        continue;
                    }
                    match punct {
                        Punct::Assign => {
                            if BP_ASSIGN < min_bp {
                                return Ok(());
                            }
                            self.pos += 1;
                            self.parse_infix(units, BP_ASSIGN)?;
                            units.push(Xunit::OperatorRpn {
                                op: Xop::Assign,
                                assign: false,
                            });
                        }
                        Punct::AndL | Punct::AndLEq => {
                            let assign = punct == Punct::AndLEq;
                            let bp = if assign { BP_ASSIGN } else { 5 };
                            if bp < min_bp {
                                return Ok(());
                            }
                            self.pos += 1;
                            let mut rhs = Expr::new();
                            self.parse_infix(&mut rhs, if assign { BP_ASSIGN } else { bp + 1 })?;
                            units.push(Xunit::Branch {
                                assign,
                                branch_true: rhs,
                                branch_false: Vec::new(),
                            });
                        }
                        Punct::OrL | Punct::OrLEq => {
                            let assign = punct == Punct::OrLEq;
                            let bp = if assign { BP_ASSIGN } else { 4 };
                            if bp < min_bp {
                                return Ok(());
                            }
                            self.pos += 1;
                            let mut rhs = Expr::new();
                            self.parse_infix(&mut rhs, if assign { BP_ASSIGN } else { bp + 1 })?;
                            units.push(Xunit::Branch {
                                assign,
                                branch_true: Vec::new(),
                                branch_false: rhs,
                            });
                        }
                        Punct::Coales | Punct::CoalesEq => {
                            let assign = punct == Punct::CoalesEq;
                            let bp = if assign { BP_ASSIGN } else { 3 };
                            if bp < min_bp {
                                return Ok(());
                            }
                            self.pos += 1;
                            let mut rhs = Expr::new();
                            self.parse_infix(&mut rhs, if assign { BP_ASSIGN } else { bp + 1 })?;
                            units.push(Xunit::Coalescence {
                                assign,
                                branch_null: rhs,
                            });
                        }
                        Punct::Quest | Punct::QuestEq => {
                            let assign = punct == Punct::QuestEq;
                            if BP_ASSIGN < min_bp {
                                return Ok(());
                            }
                            self.pos += 1;
                            let mut branch_true = Expr::new();
                            self.parse_infix(&mut branch_true, BP_ASSIGN)?;
                            self.expect_punct(Punct::Colon, ParseErrorCode::ColonExpected)?;
                            let mut branch_false = Expr::new();
                            self.parse_infix(&mut branch_false, BP_ASSIGN)?;
                            units.push(Xunit::Branch {
                                assign,
                                branch_true,
                                branch_false,
                            });
                        }
                        _ => return Ok(()),
                    }
                }
                // `and` / `or` spellings of the logical operators.
                TokenKind::Keyword(Keyword::And) => {
                    if 5 < min_bp {
                        return Ok(());
                    }
                    self.pos += 1;
                    let mut rhs = Expr::new();
                    self.parse_infix(&mut rhs, 6)?;
                    units.push(Xunit::Branch {
                        assign: false,
                        branch_true: rhs,
                        branch_false: Vec::new(),
                    });
                }
                TokenKind::Keyword(Keyword::Or) => {
                    if 4 < min_bp {
                        return Ok(());
                    }
                    self.pos += 1;
                    let mut rhs = Expr::new();
                    self.parse_infix(&mut rhs, 5)?;
                    units.push(Xunit::Branch {
                        assign: false,
                        branch_true: Vec::new(),
                        branch_false: rhs,
                    });
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_unary(&mut self, units: &mut Expr) -> Result<(), ParseError> {
        let Some(token) = self.current() else {
            return Err(self.error(ParseErrorCode::ExpressionExpected));
        };
        let prefix = match &token.kind {
            TokenKind::Punct(Punct::Add) => Some(Xop::Pos),
            TokenKind::Punct(Punct::Sub) => Some(Xop::Neg),
            TokenKind::Punct(Punct::NotB) => Some(Xop::NotB),
            TokenKind::Punct(Punct::NotL) => Some(Xop::NotL),
            TokenKind::Punct(Punct::Inc) => Some(Xop::PrefixInc),
            TokenKind::Punct(Punct::Dec) => Some(Xop::PrefixDec),
            TokenKind::Keyword(Keyword::Not) => Some(Xop::NotL),
            TokenKind::Keyword(Keyword::Unset) => Some(Xop::Unset),
            TokenKind::Keyword(Keyword::Lengthof) => Some(Xop::Lengthof),
            TokenKind::Keyword(Keyword::Typeof) => Some(Xop::Typeof),
            TokenKind::Keyword(Keyword::Abs) => Some(Xop::Abs),
            TokenKind::Keyword(Keyword::Sqrt) => Some(Xop::Sqrt),
            TokenKind::Keyword(Keyword::Signb) => Some(Xop::Signb),
            TokenKind::Keyword(Keyword::Isnan) => Some(Xop::Isnan),
            TokenKind::Keyword(Keyword::Isinf) => Some(Xop::Isinf),
            TokenKind::Keyword(Keyword::Round) => Some(Xop::Round),
            TokenKind::Keyword(Keyword::Floor) => Some(Xop::Floor),
            TokenKind::Keyword(Keyword::Ceil) => Some(Xop::Ceil),
            TokenKind::Keyword(Keyword::Trunc) => Some(Xop::Trunc),
            TokenKind::Keyword(Keyword::Iround) => Some(Xop::Iround),
            TokenKind::Keyword(Keyword::Ifloor) => Some(Xop::Ifloor),
            TokenKind::Keyword(Keyword::Iceil) => Some(Xop::Iceil),
            TokenKind::Keyword(Keyword::Itrunc) => Some(Xop::Itrunc),
            _ => None,
        };
        if let Some(op) = prefix {
            self.pos += 1;
            self.parse_unary(units)?;
            units.push(Xunit::OperatorRpn { op, assign: false });
            return Ok(());
        }
        if self.at_keyword(Keyword::Fma) {
            // `__fma(x, y, z)` is operator syntax, not a call.
            self.pos += 1;
            self.expect_punct(Punct::ParenOp, ParseErrorCode::OpenParenthesisExpected)?;
            let mut sub = self.parse_expression()?;
            units.append(&mut sub);
            self.expect_punct(Punct::Comma, ParseErrorCode::CommaExpected)?;
            let mut sub = self.parse_expression()?;
            units.append(&mut sub);
            self.expect_punct(Punct::Comma, ParseErrorCode::CommaExpected)?;
            let mut sub = self.parse_expression()?;
            units.append(&mut sub);
            self.expect_punct(Punct::ParenCl, ParseErrorCode::CloseParenthesisExpected)?;
            units.push(Xunit::OperatorRpn {
                op: Xop::Fma,
                assign: false,
            });
            return Ok(());
        }
        self.parse_primary(units)?;
        self.parse_postfix(units)
    }

    fn parse_primary(&mut self, units: &mut Expr) -> Result<(), ParseError> {
        let Some(token) = self.current() else {
            return Err(self.error(ParseErrorCode::ExpressionExpected));
        };
        let line = token.span.line;
        match token.kind.clone() {
            TokenKind::IntLit(n) => {
                self.pos += 1;
                units.push(Xunit::Literal { value: Value::Int(n) });
            }
            TokenKind::RealLit(r) => {
                self.pos += 1;
                units.push(Xunit::Literal { value: Value::Real(r) });
            }
            TokenKind::StrLit(s) => {
                self.pos += 1;
                units.push(Xunit::Literal {
                    value: Value::string(s),
                });
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.pos += 1;
                units.push(Xunit::Literal { value: Value::Null });
            }
            TokenKind::Keyword(Keyword::True) => {
                self.pos += 1;
                units.push(Xunit::Literal {
                    value: Value::Bool(true),
                });
            }
            TokenKind::Keyword(Keyword::False) => {
                self.pos += 1;
                units.push(Xunit::Literal {
                    value: Value::Bool(false),
                });
            }
            TokenKind::Keyword(Keyword::Nan) => {
                self.pos += 1;
                units.push(Xunit::Literal {
                    value: Value::Real(f64::NAN),
                });
            }
            TokenKind::Keyword(Keyword::Infinity) => {
                self.pos += 1;
                units.push(Xunit::Literal {
                    value: Value::Real(f64::INFINITY),
                });
            }
            TokenKind::Keyword(Keyword::This) => {
                self.pos += 1;
                units.push(Xunit::NamedRef {
                    name: "__this".to_string(),
                });
            }
            TokenKind::Keyword(Keyword::File) => {
                self.pos += 1;
                units.push(Xunit::Literal {
                    value: Value::string(self.file.clone()),
                });
            }
            TokenKind::Keyword(Keyword::Line) => {
                self.pos += 1;
                units.push(Xunit::Literal {
                    value: Value::Int(i64::from(line)),
                });
            }
            TokenKind::Ident(name) => {
                self.pos += 1;
                units.push(Xunit::NamedRef { name });
            }
            TokenKind::Punct(Punct::ParenOp) => {
                self.pos += 1;
                self.parse_infix(units, 0)?;
                self.expect_punct(Punct::ParenCl, ParseErrorCode::CloseParenthesisExpected)?;
            }
            TokenKind::Punct(Punct::BracketOp) => {
                self.pos += 1;
                let mut elem_cnt = 0usize;
                loop {
                    if self.eat_punct(Punct::BracketCl) {
                        break;
                    }
                    if self.current().is_none() {
                        return Err(self.error(ParseErrorCode::CloseBracketOrExpressionExpected));
                    }
                    self.parse_infix(units, 0)?;
                    elem_cnt += 1;
                    if self.eat_punct(Punct::Comma) {
                        continue;
                    }
                    self.expect_punct(
                        Punct::BracketCl,
                        ParseErrorCode::CloseBracketOrExpressionExpected,
                    )?;
                    break;
                }
                units.push(Xunit::UnnamedArray { elem_cnt });
            }
            TokenKind::Punct(Punct::BraceOp) => {
                self.pos += 1;
                let mut keys: Vec<String> = Vec::new();
                loop {
                    if self.eat_punct(Punct::BraceCl) {
                        break;
                    }
                    let (key, key_span) = match self.current() {
                        Some(Token { kind: TokenKind::Ident(name), span }) => {
                            (name.clone(), *span)
                        }
                        Some(Token { kind: TokenKind::StrLit(text), span }) => {
                            (text.clone(), *span)
                        }
                        _ => return Err(self.error(ParseErrorCode::CloseBraceOrObjectKeyExpected)),
                    };
                    self.pos += 1;
                    if keys.iter().any(|k| *k == key) {
                        return Err(self.error_at(key_span, ParseErrorCode::DuplicateObjectKey));
                    }
                    // Accept both `key : value` and `key = value`.
                    if !self.eat_punct(Punct::Colon) && !self.eat_punct(Punct::Assign) {
                        return Err(self.error(ParseErrorCode::ColonExpected));
                    }
                    self.parse_infix(units, 0)?;
                    keys.push(key);
                    if self.eat_punct(Punct::Comma) {
                        continue;
                    }
                    self.expect_punct(
                        Punct::BraceCl,
                        ParseErrorCode::CloseBraceOrObjectKeyExpected,
                    )?;
                    break;
                }
                units.push(Xunit::UnnamedObject { keys });
            }
            TokenKind::Keyword(Keyword::Func) => {
                let loc = SourceLocation::new(self.file.clone(), line);
                self.pos += 1;
                let params = self.parse_param_list()?;
                let body = self.parse_braced_block()?;
                units.push(Xunit::ClosureFunc {
                    header: FnHeader {
                        loc,
                        name: "<closure>".to_string(),
                        params,
                    },
                    body,
                });
            }
            _ => return Err(self.error(ParseErrorCode::ExpressionExpected)),
        }
        Ok(())
    }

    fn parse_postfix(&mut self, units: &mut Expr) -> Result<(), ParseError> {
        loop {
            let Some(token) = self.current() else {
                return Ok(());
            };
            match &token.kind {
                TokenKind::Punct(Punct::ParenOp) => {
                    let loc = self.loc_here();
                    self.pos += 1;
                    let mut arg_cnt = 0usize;
                    loop {
                        if self.eat_punct(Punct::ParenCl) {
                            break;
                        }
                        if self.current().is_none() {
                            return Err(
                                self.error(ParseErrorCode::CloseParenthesisOrArgumentExpected)
                            );
                        }
                        // A leading `&` passes the argument by reference;
                        // otherwise an identity operator materializes a
                        // temporary copy.
                        let by_ref = self.eat_punct(Punct::AndB);
                        self.parse_infix(units, 0)?;
                        if !by_ref {
                            units.push(Xunit::OperatorRpn {
                                op: Xop::Pos,
                                assign: false,
                            });
                        }
                        arg_cnt += 1;
                        if self.eat_punct(Punct::Comma) {
                            continue;
                        }
                        self.expect_punct(
                            Punct::ParenCl,
                            ParseErrorCode::CloseParenthesisOrArgumentExpected,
                        )?;
                        break;
                    }
                    units.push(Xunit::FuncCall { loc, arg_cnt });
                }
                TokenKind::Punct(Punct::BracketOp) => {
                    self.pos += 1;
                    self.parse_infix(units, 0)?;
                    self.expect_punct(Punct::BracketCl, ParseErrorCode::CloseBracketExpected)?;
                    units.push(Xunit::OperatorRpn {
                        op: Xop::Subscr,
                        assign: false,
                    });
                }
                TokenKind::Punct(Punct::Dot) => {
                    self.pos += 1;
                    let (key, _) = self.expect_ident()?;
                    units.push(Xunit::MemberAccess { key });
                }
                TokenKind::Punct(Punct::Inc) => {
                    self.pos += 1;
                    units.push(Xunit::OperatorRpn {
                        op: Xop::PostfixInc,
                        assign: false,
                    });
                }
                TokenKind::Punct(Punct::Dec) => {
                    self.pos += 1;
                    units.push(Xunit::OperatorRpn {
                        op: Xop::PostfixDec,
                        assign: false,
                    });
                }
                _ => return Ok(()),
            }
        }
    }
}

/// Plain left-associative binary operators: spelling → (binding power, op).
fn binary_op(punct: Punct) -> Option<(u8, Xop)> {
    Some(match punct {
        Punct::Mul => (13, Xop::Mul),
        Punct::Div => (13, Xop::Div),
        Punct::Mod => (13, Xop::Mod),
        Punct::Add => (12, Xop::Add),
        Punct::Sub => (12, Xop::Sub),
        Punct::Sla => (11, Xop::Sla),
        Punct::Sra => (11, Xop::Sra),
        Punct::Sll => (11, Xop::Sll),
        Punct::Srl => (11, Xop::Srl),
        Punct::CmpLt => (10, Xop::CmpLt),
        Punct::CmpLte => (10, Xop::CmpLte),
        Punct::CmpGt => (10, Xop::CmpGt),
        Punct::CmpGte => (10, Xop::CmpGte),
        Punct::CmpEq => (9, Xop::CmpEq),
        Punct::CmpNe => (9, Xop::CmpNe),
        Punct::Cmp3Way => (9, Xop::Cmp3Way),
        Punct::AndB => (8, Xop::AndB),
        Punct::XorB => (7, Xop::XorB),
        Punct::OrB => (6, Xop::OrB),
        _ => return None,
    })
}

/// Compound assignment spellings for the plain binary operators.
fn compound_assign_op(punct: Punct) -> Option<Xop> {
    Some(match punct {
        Punct::AddEq => Xop::Add,
        Punct::SubEq => Xop::Sub,
        Punct::MulEq => Xop::Mul,
        Punct::DivEq => Xop::Div,
        Punct::ModEq => Xop::Mod,
        Punct::SlaEq => Xop::Sla,
        Punct::SraEq => Xop::Sra,
        Punct::SllEq => Xop::Sll,
        Punct::SrlEq => Xop::Srl,
        Punct::AndBEq => Xop::AndB,
        Punct::OrBEq => Xop::OrB,
        Punct::XorBEq => Xop::XorB,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::Lexer;

    fn parse(src: &str) -> Block {
        let tokens = Lexer::new(src.as_bytes()).unwrap().tokenize().unwrap();
        Parser::new(tokens, "test.qz").parse_program().unwrap()
    }

    fn parse_err(src: &str) -> ParseErrorCode {
        let tokens = Lexer::new(src.as_bytes()).unwrap().tokenize().unwrap();
        Parser::new(tokens, "test.qz").parse_program().unwrap_err().code
    }

    fn first_expr(block: &Block) -> &Expr {
        match &block.stmts[0] {
            Stmt::Expression { expr } => expr,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn arithmetic_lowers_to_rpn() {
        let block = parse("1 + 2 * 3;");
        let units = first_expr(&block);
        assert_eq!(units.len(), 5);
        assert!(matches!(units[0], Xunit::Literal { .. }));
        assert!(matches!(units[1], Xunit::Literal { .. }));
        assert!(matches!(units[2], Xunit::Literal { .. }));
        assert!(matches!(
            units[3],
            Xunit::OperatorRpn { op: Xop::Mul, assign: false }
        ));
        assert!(matches!(
            units[4],
            Xunit::OperatorRpn { op: Xop::Add, assign: false }
        ));
    }

    #[test]
    fn shift_binds_tighter_than_relational() {
        let block = parse("1 << 2 < 3;");
        let units = first_expr(&block);
        assert!(matches!(
            units[2],
            Xunit::OperatorRpn { op: Xop::Sla, assign: false }
        ));
        assert!(matches!(
            units[4],
            Xunit::OperatorRpn { op: Xop::CmpLt, assign: false }
        ));
    }

    #[test]
    fn assignment_is_right_associative() {
        let block = parse("a = b = 1;");
        let units = first_expr(&block);
        // a b 1 = =
        assert!(matches!(units[4], Xunit::OperatorRpn { op: Xop::Assign, .. }));
        assert!(matches!(units[3], Xunit::OperatorRpn { op: Xop::Assign, .. }));
    }

    #[test]
    fn compound_assign_sets_the_flag() {
        let block = parse("a += 1;");
        let units = first_expr(&block);
        assert!(matches!(
            units[2],
            Xunit::OperatorRpn { op: Xop::Add, assign: true }
        ));
    }

    #[test]
    fn logical_and_lowers_to_branch() {
        let block = parse("a && b;");
        let units = first_expr(&block);
        match &units[1] {
            Xunit::Branch {
                assign: false,
                branch_true,
                branch_false,
            } => {
                assert_eq!(branch_true.len(), 1);
                assert!(branch_false.is_empty());
            }
            other => panic!("expected branch, got {:?}", other),
        }
    }

    #[test]
    fn ternary_carries_both_branches() {
        let block = parse("a ? b : c;");
        let units = first_expr(&block);
        match &units[1] {
            Xunit::Branch {
                branch_true,
                branch_false,
                ..
            } => {
                assert_eq!(branch_true.len(), 1);
                assert_eq!(branch_false.len(), 1);
            }
            other => panic!("expected branch, got {:?}", other),
        }
    }

    #[test]
    fn coalescence_lowers_to_its_own_unit() {
        let block = parse("a ?? b;");
        let units = first_expr(&block);
        assert!(matches!(units[1], Xunit::Coalescence { assign: false, .. }));
        let block = parse("a ??= b;");
        let units = first_expr(&block);
        assert!(matches!(units[1], Xunit::Coalescence { assign: true, .. }));
    }

    #[test]
    fn call_arguments_materialize_unless_passed_by_reference() {
        let block = parse("f(a, &b);");
        let units = first_expr(&block);
        // f a pos b call(2)
        assert!(matches!(units[0], Xunit::NamedRef { .. }));
        assert!(matches!(units[2], Xunit::OperatorRpn { op: Xop::Pos, .. }));
        assert!(matches!(units[3], Xunit::NamedRef { .. }));
        assert!(matches!(units[4], Xunit::FuncCall { arg_cnt: 2, .. }));
    }

    #[test]
    fn member_and_subscript_postfixes() {
        let block = parse("o.key[1];");
        let units = first_expr(&block);
        assert!(matches!(units[1], Xunit::MemberAccess { .. }));
        assert!(matches!(units[3], Xunit::OperatorRpn { op: Xop::Subscr, .. }));
    }

    #[test]
    fn array_and_object_literals() {
        let block = parse("[1, 2, 3];");
        assert!(matches!(
            first_expr(&block)[3],
            Xunit::UnnamedArray { elem_cnt: 3 }
        ));
        let block = parse("var o = { x: 1, y = 2 };");
        match &block.stmts[0] {
            Stmt::VarDef { decls, .. } => match &decls[0].init[2] {
                Xunit::UnnamedObject { keys } => assert_eq!(keys, &["x", "y"]),
                other => panic!("expected object literal, got {:?}", other),
            },
            other => panic!("expected var definition, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_object_key_is_rejected() {
        assert_eq!(
            parse_err("var o = { x: 1, x: 2 };"),
            ParseErrorCode::DuplicateObjectKey
        );
    }

    #[test]
    fn var_lists_share_one_statement() {
        let block = parse("var a = 1, b, c = 3;");
        match &block.stmts[0] {
            Stmt::VarDef { decls, immutable, .. } => {
                assert!(!immutable);
                assert_eq!(decls.len(), 3);
                assert_eq!(decls[1].name, "b");
            }
            other => panic!("expected var definition, got {:?}", other),
        }
    }

    #[test]
    fn const_requires_an_initializer() {
        assert_eq!(parse_err("const a;"), ParseErrorCode::EqualsSignExpected);
    }

    #[test]
    fn func_def_and_variadic_params() {
        let block = parse("func f(a, b, ...) { return a; }");
        match &block.stmts[0] {
            Stmt::FuncDef { header, .. } => {
                assert!(header.is_variadic());
                assert_eq!(header.binding_params().len(), 2);
            }
            other => panic!("expected function definition, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_parameter_is_rejected() {
        assert_eq!(
            parse_err("func f(a, a) {}"),
            ParseErrorCode::DuplicateParameterName
        );
    }

    #[test]
    fn reserved_identifiers_cannot_be_declared() {
        assert_eq!(parse_err("var __x = 1;"), ParseErrorCode::ReservedIdentifier);
        assert_eq!(
            parse_err("func f(__a) {}"),
            ParseErrorCode::ReservedIdentifier
        );
        assert_eq!(
            parse_err("try {} catch(__e) {}"),
            ParseErrorCode::ReservedIdentifier
        );
    }

    #[test]
    fn switch_clauses_with_default() {
        let block = parse("switch(x) { case 1: break; case 2: default: break; }");
        match &block.stmts[0] {
            Stmt::Switch { clauses, .. } => {
                assert_eq!(clauses.len(), 3);
                assert!(clauses[0].label.is_some());
                assert!(clauses[1].body.is_empty());
                assert!(clauses[2].label.is_none());
            }
            other => panic!("expected switch, got {:?}", other),
        }
    }

    #[test]
    fn two_defaults_are_rejected() {
        assert_eq!(
            parse_err("switch(x) { default: default: }"),
            ParseErrorCode::CloseBraceOrSwitchClauseExpected
        );
    }

    #[test]
    fn for_loop_forms() {
        let block = parse("for(var i = 0; i < 3; i += 1) {}");
        assert!(matches!(block.stmts[0], Stmt::For { .. }));
        let block = parse("for(;;) {}");
        match &block.stmts[0] {
            Stmt::For { init, cond, step, .. } => {
                assert!(init.is_none());
                assert!(cond.is_empty());
                assert!(step.is_empty());
            }
            other => panic!("expected for, got {:?}", other),
        }
        let block = parse("for each(k, v : o) {}");
        assert!(matches!(block.stmts[0], Stmt::ForEach { .. }));
    }

    #[test]
    fn do_while_requires_trailing_semicolon() {
        let block = parse("do { } while(x);");
        assert!(matches!(block.stmts[0], Stmt::DoWhile { negate: false, .. }));
        assert_eq!(parse_err("do { } until(x);"), ParseErrorCode::KeywordWhileExpected);
    }

    #[test]
    fn negated_conditions() {
        let block = parse("if !(x) {} else {}");
        assert!(matches!(block.stmts[0], Stmt::If { negate: true, .. }));
        let block = parse("while !(x) {}");
        assert!(matches!(block.stmts[0], Stmt::While { negate: true, .. }));
    }

    #[test]
    fn try_requires_catch() {
        assert_eq!(parse_err("try {}"), ParseErrorCode::KeywordCatchExpected);
    }

    #[test]
    fn break_and_continue_targets() {
        let block = parse("while(1) { break while; }");
        match &block.stmts[0] {
            Stmt::While { body, .. } => {
                assert!(matches!(body.stmts[0], Stmt::Break { target: Target::While }));
            }
            other => panic!("expected while, got {:?}", other),
        }
    }

    #[test]
    fn return_by_reference() {
        let block = parse("return &x;");
        assert!(matches!(block.stmts[0], Stmt::Return { by_ref: true, .. }));
        let block = parse("return;");
        match &block.stmts[0] {
            Stmt::Return { by_ref, expr } => {
                assert!(!by_ref);
                assert!(matches!(expr[0], Xunit::Literal { .. }));
            }
            other => panic!("expected return, got {:?}", other),
        }
    }

    #[test]
    fn assert_with_message() {
        let block = parse(r#"assert !x : "must be falsy";"#);
        match &block.stmts[0] {
            Stmt::Assert { negate, message, .. } => {
                assert!(negate);
                assert_eq!(message.as_deref(), Some("must be falsy"));
            }
            other => panic!("expected assert, got {:?}", other),
        }
    }

    #[test]
    fn defer_statement() {
        let block = parse("defer f();");
        assert!(matches!(block.stmts[0], Stmt::Defer { .. }));
    }

    #[test]
    fn this_parses_to_the_reserved_name() {
        let block = parse("this.x;");
        let units = first_expr(&block);
        match &units[0] {
            Xunit::NamedRef { name } => assert_eq!(name, "__this"),
            other => panic!("expected named reference, got {:?}", other),
        }
    }

    #[test]
    fn file_and_line_are_constants() {
        let block = parse("__file + \"\";\n__line;");
        match &block.stmts[1] {
            Stmt::Expression { expr } => match &expr[0] {
                Xunit::Literal { value } => assert!(value.equals(&Value::Int(2))),
                other => panic!("expected literal, got {:?}", other),
            },
            other => panic!("expected expression, got {:?}", other),
        }
    }

    #[test]
    fn fma_is_a_ternary_operator() {
        let block = parse("__fma(a, b, c);");
        let units = first_expr(&block);
        assert!(matches!(
            units[3],
            Xunit::OperatorRpn { op: Xop::Fma, assign: false }
        ));
    }

    #[test]
    fn closure_expression() {
        let block = parse("var f = func(x) { return x; };");
        match &block.stmts[0] {
            Stmt::VarDef { decls, .. } => {
                assert!(matches!(decls[0].init[0], Xunit::ClosureFunc { .. }));
            }
            other => panic!("expected var definition, got {:?}", other),
        }
    }

    #[test]
    fn missing_semicolon_is_reported() {
        assert_eq!(parse_err("1 + 2"), ParseErrorCode::SemicolonExpected);
    }

    #[test]
    fn stray_closing_brace_is_a_statement_error() {
        assert_eq!(parse_err("}"), ParseErrorCode::ExpressionExpected);
    }
}
