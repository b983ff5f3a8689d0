use super::{format::MultilineItem, var_expr, Parser};
use crate::{
    ast::{
        AnyExpr, ArrayLiteral, BinaryExpr, BoolLiteral, DotExpr, Expr, ExprKind, FuncCall,
        GroupExpr, IndexExpr, MapLiteral, NumLiteral, Operator, SliceExpr, StringLiteral,
        TypeAssertion, UnaryExpr,
    },
    common::quote,
    token::{Token, TokenKind},
    types::{combine_types, Type, TypeName},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Or,
    And,
    Equals,
    LessGreater,
    Sum,
    Product,
    Unary,
    Index,
}

impl TokenKind {
    fn precedence(&self) -> Precedence {
        match self {
            TokenKind::Or => Precedence::Or,
            TokenKind::And => Precedence::And,
            TokenKind::Eq | TokenKind::NotEq => Precedence::Equals,
            TokenKind::Lt | TokenKind::Gt | TokenKind::LtEq | TokenKind::GtEq => {
                Precedence::LessGreater
            }
            TokenKind::Plus | TokenKind::Minus => Precedence::Sum,
            TokenKind::Asterisk | TokenKind::Slash | TokenKind::Percent => Precedence::Product,
            TokenKind::LBracket | TokenKind::Dot => Precedence::Index,
            _ => Precedence::Lowest,
        }
    }

    fn is_binary_op(&self) -> bool {
        self.precedence() > Precedence::Lowest && self.precedence() < Precedence::Unary
    }
}

impl<'a> Parser<'a> {
    /// Parses an expression where a bare function call is allowed, i.e. on
    /// the right of `:=` and `=`, after `return` and in conditions.
    pub(super) fn parse_top_level_expr(&mut self) -> Option<Expr> {
        let cur = self.cur();
        if cur.kind == TokenKind::Ident && self.is_func_call(&cur.literal) {
            return self.parse_func_call_expr();
        }
        self.parse_expr(Precedence::Lowest)
    }

    fn parse_func_call_expr(&mut self) -> Option<Expr> {
        let (token, call) = self.parse_func_call()?;
        let t = call.signature.return_type.fixed();
        Some(Expr::new(call, token, t))
    }

    pub(super) fn parse_func_call(&mut self) -> Option<(Token, FuncCall)> {
        let token = self.cur().clone();
        let signature = self.funcs.get(&token.literal).cloned()?;
        self.advance();
        let args = self.parse_expr_list()?;
        let args = self.check_args(&signature, args);
        let call = FuncCall {
            name: token.literal.clone(),
            args,
            signature,
        };
        Some((token, call))
    }

    /// Parses whitespace separated expressions up to the end of the line
    /// or a closing paren or bracket.
    pub(super) fn parse_expr_list(&mut self) -> Option<Vec<Expr>> {
        let mut list = Vec::new();
        while !matches!(
            self.cur().kind,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::Eof
        ) && !self.is_at_eol()
        {
            list.push(self.parse_expr_wss()?);
            self.advance_if_ws();
        }
        Some(list)
    }

    fn parse_expr_wss(&mut self) -> Option<Expr> {
        self.push_wss(true);
        let expr = self.parse_expr(Precedence::Lowest);
        self.pop_wss();
        expr
    }

    fn parse_expr(&mut self, precedence: Precedence) -> Option<Expr> {
        let mut left = match self.cur().kind {
            TokenKind::Ident => self.lookup_var()?,
            TokenKind::StringLit
            | TokenKind::NumLit
            | TokenKind::True
            | TokenKind::False
            | TokenKind::LBracket
            | TokenKind::LCurly => self.parse_literal()?,
            TokenKind::Bang | TokenKind::Minus => self.parse_unary_expr()?,
            TokenKind::LParen => self.parse_grouped_expr()?,
            _ => {
                self.unexpected_left_token_error();
                return None;
            }
        };
        while !self.is_at_expr_end() && precedence < self.cur().kind.precedence() {
            let kind = self.cur().kind;
            left = if kind.is_binary_op() {
                self.parse_binary_expr(left)?
            } else if kind == TokenKind::LBracket {
                self.parse_index_or_slice_expr(left, true)?
            } else if kind == TokenKind::Dot && self.peek().kind == TokenKind::LParen {
                self.parse_type_assertion(left)?
            } else {
                self.parse_dot_expr(left)?
            };
        }
        Some(left)
    }

    fn is_at_expr_end(&self) -> bool {
        (self.is_wss() && self.cur().kind == TokenKind::Ws) || self.is_at_eol()
    }

    fn unexpected_left_token_error(&mut self) {
        if self.is_wss() {
            let kind = self.cur().kind;
            let prev = self.pos.checked_sub(1).map(|pos| self.look_at(pos).clone());
            if let Some(prev) = prev {
                if kind.is_binary_op() && prev.kind == TokenKind::Ws {
                    let message = format!("unexpected whitespace before {}", self.cur().format_details());
                    self.error(&message);
                    return;
                }
                if kind == TokenKind::Ws && prev.kind.is_binary_op() {
                    let message = format!("unexpected whitespace after {}", prev.format_details());
                    self.error_at(&prev, &message);
                    return;
                }
            }
        }
        let message = format!("unexpected {}", self.cur().format_details());
        self.error(&message);
    }

    fn lookup_var(&mut self) -> Option<Expr> {
        let token = self.cur().clone();
        self.advance();
        let name = &token.literal;
        if name == "_" {
            self.error_at(&token, "anonymous variable \"_\" cannot be read");
            return None;
        }
        if let Some(var) = self.scopes.get(name) {
            return Some(var_expr(var, token));
        }
        let message = if self.is_func_call(name) {
            format!("function call must be parenthesized: ({} ...)", name)
        } else {
            format!("unknown variable name {}", quote(name))
        };
        self.error_at(&token, &message);
        None
    }

    fn parse_unary_expr(&mut self) -> Option<Expr> {
        let token = self.cur().clone();
        let op = Operator::from_token_kind(token.kind)?;
        self.advance();
        if self.prev_kind() == Some(TokenKind::Ws) {
            let message = format!("unexpected whitespace after {}", quote(op.as_str()));
            self.error_at(&token, &message);
            return None;
        }
        let right = self.parse_expr(Precedence::Unary)?;
        let expected = if op == Operator::Minus {
            Type::NUM
        } else {
            Type::BOOL
        };
        if right.t != expected {
            let message = format!(
                "{} unary expects {} type, found {}",
                quote(op.as_str()),
                expected,
                right.t
            );
            self.error_at(&token, &message);
            return None;
        }
        let t = right.t.clone();
        let right = Box::new(right);
        Some(Expr::new(UnaryExpr { op, right }, token, t))
    }

    fn parse_binary_expr(&mut self, left: Expr) -> Option<Expr> {
        let token = self.cur().clone();
        let op = Operator::from_token_kind(token.kind)?;
        let precedence = token.kind.precedence();
        self.advance();
        let right = self.parse_expr(precedence)?;
        let (left, right) = concat_operands(op, left, right);
        if !self.validate_binary_types(op, &left.t, &right.t, &token) {
            return None;
        }
        let t = if op.is_comparison() {
            Type::BOOL
        } else if left.t.is_empty() {
            right.t.clone()
        } else if right.t.fixed {
            left.t.fixed()
        } else {
            left.t.clone()
        };
        let id = self.next_id();
        if self.is_wss() {
            self.formatting.wss.insert(id);
        }
        let binary = BinaryExpr {
            op,
            left: Box::new(left),
            right: Box::new(right),
            id,
        };
        Some(Expr::new(binary, token, t))
    }

    fn validate_binary_types(&mut self, op: Operator, left: &Type, right: &Type, token: &Token) -> bool {
        if !left.matches(right) {
            let message = format!("mismatched type for {}: {}, {}", op, left, right);
            self.error_at(token, &message);
            return false;
        }
        let name = quote(op.as_str());
        let message = match op {
            Operator::Plus
                if *left != Type::NUM
                    && *left != Type::STRING
                    && left.name != TypeName::Array =>
            {
                format!("{} takes num, string or array type, found {}", name, left)
            }
            Operator::Minus | Operator::Asterisk | Operator::Slash | Operator::Percent
                if *left != Type::NUM =>
            {
                format!("{} takes num type, found {}", name, left)
            }
            Operator::Lt | Operator::Gt | Operator::LtEq | Operator::GtEq
                if *left != Type::NUM && *left != Type::STRING =>
            {
                format!("{} takes num or string type, found {}", name, left)
            }
            Operator::And | Operator::Or if *left != Type::BOOL => {
                format!("{} takes bool type, found {}", name, left)
            }
            _ => return true,
        };
        self.error_at(token, &message);
        false
    }

    fn parse_grouped_expr(&mut self) -> Option<Expr> {
        self.push_wss(false);
        let expr = self.parse_group();
        self.pop_wss();
        expr
    }

    fn parse_group(&mut self) -> Option<Expr> {
        let token = self.cur().clone();
        self.advance();
        let expr = self.parse_top_level_expr();
        let closed = self.assert_token(TokenKind::RParen);
        let expr = expr?;
        if !closed {
            return None;
        }
        self.advance_wss();
        let t = expr.t.clone();
        let expr = Box::new(expr);
        Some(Expr::new(GroupExpr { expr }, token, t))
    }

    pub(super) fn parse_index_or_slice_expr(&mut self, left: Expr, allow_slice: bool) -> Option<Expr> {
        self.push_wss(false);
        let expr = self.parse_index_or_slice(left, allow_slice);
        self.pop_wss();
        expr
    }

    fn parse_index_or_slice(&mut self, left: Expr, allow_slice: bool) -> Option<Expr> {
        let token = self.cur().clone();
        if self.prev_kind() == Some(TokenKind::Ws) {
            self.error("unexpected whitespace before \"[\"");
            return None;
        }
        self.advance();
        let left_name = left.t.name;
        if !matches!(left_name, TypeName::Array | TypeName::Map | TypeName::String) {
            let message = format!(
                "only array, string and map type can be indexed, found {}",
                left.t
            );
            self.error_at(&token, &message);
            return None;
        }
        if allow_slice && self.cur().kind == TokenKind::Colon {
            self.advance();
            return self.parse_slice(token, left, None);
        }
        let index = self.parse_top_level_expr()?;
        if allow_slice && self.cur().kind == TokenKind::Colon {
            self.advance();
            return self.parse_slice(token, left, Some(index));
        }
        if !self.assert_token(TokenKind::RBracket) {
            return None;
        }
        let expected = if left_name == TypeName::Map {
            Type::STRING
        } else {
            Type::NUM
        };
        if index.t != expected {
            let message = format!(
                "{} index expects {}, found {}",
                left_name.name(),
                expected,
                index.t
            );
            self.error_at(&token, &message);
            return None;
        }
        self.advance_wss();
        let t = if left_name == TypeName::String {
            Type::STRING
        } else {
            left.t.elem().fixed()
        };
        let index = IndexExpr {
            left: Box::new(left),
            index: Box::new(index),
        };
        Some(Expr::new(index, token, t))
    }

    fn parse_slice(&mut self, token: Token, left: Expr, start: Option<Expr>) -> Option<Expr> {
        if !matches!(left.t.name, TypeName::Array | TypeName::String) {
            let message = format!("only array and string can be sliced, found {}", left.t);
            self.error_at(&token, &message);
            return None;
        }
        let end = if self.cur().kind == TokenKind::RBracket {
            None
        } else {
            Some(self.parse_top_level_expr()?)
        };
        if !self.assert_token(TokenKind::RBracket) {
            return None;
        }
        for bound in start.iter().chain(end.iter()) {
            if bound.t != Type::NUM {
                let message = format!("slice bounds expect num, found {}", bound.t);
                self.error_at(&bound.token, &message);
                return None;
            }
        }
        self.advance_wss();
        let t = left.t.unfixed();
        let slice = SliceExpr {
            left: Box::new(left),
            start: start.map(Box::new),
            end: end.map(Box::new),
        };
        Some(Expr::new(slice, token, t))
    }

    fn check_dot_whitespace(&mut self) -> bool {
        if self.prev_kind() == Some(TokenKind::Ws) {
            self.error("unexpected whitespace before \".\"");
            return false;
        }
        if self.look_at(self.pos + 1).kind == TokenKind::Ws {
            self.error("unexpected whitespace after \".\"");
            return false;
        }
        true
    }

    pub(super) fn parse_dot_expr(&mut self, left: Expr) -> Option<Expr> {
        let token = self.cur().clone();
        if !self.check_dot_whitespace() {
            return None;
        }
        self.advance_wss();
        if left.t.name != TypeName::Map {
            let message = format!(
                "field access with \".\" expects map type, found {}",
                left.t
            );
            self.error_at(&token, &message);
            return None;
        }
        if self.cur().kind != TokenKind::Ident {
            let message = format!("expected map key, found {}", self.cur().kind.name());
            self.error_at(&token, &message);
            return None;
        }
        let key = self.cur().literal.clone();
        self.advance();
        let t = left.t.elem().fixed();
        let left = Box::new(left);
        Some(Expr::new(DotExpr { left, key }, token, t))
    }

    fn parse_type_assertion(&mut self, left: Expr) -> Option<Expr> {
        let token = self.cur().clone();
        if !self.check_dot_whitespace() {
            return None;
        }
        self.push_wss(false);
        let expr = self.parse_type_assertion_type(token, left);
        self.pop_wss();
        expr
    }

    fn parse_type_assertion_type(&mut self, token: Token, left: Expr) -> Option<Expr> {
        self.advance(); // "."
        self.advance(); // "("
        let t = self.parse_type();
        let mut valid = true;
        if t.name == TypeName::Illegal {
            let message = format!(
                "invalid type in type assertion of {}",
                quote(&left.to_string())
            );
            self.error_at(&token, &message);
            valid = false;
        } else if t == Type::ANY {
            self.error_at(&token, "cannot type assert to type any");
            valid = false;
        }
        if self.assert_token(TokenKind::RParen) {
            self.advance_wss();
        } else {
            valid = false;
        }
        if left.t != Type::ANY {
            let message = format!(
                "value of type assertion must be of type any, not {}",
                left.t
            );
            self.error_at(&token, &message);
            valid = false;
        }
        if !valid {
            return None;
        }
        let left = Box::new(left);
        Some(Expr::new(TypeAssertion { left }, token, t.fixed()))
    }

    fn parse_literal(&mut self) -> Option<Expr> {
        let token = self.cur().clone();
        match token.kind {
            TokenKind::StringLit => {
                self.advance();
                let value = token.literal.clone();
                Some(Expr::new(StringLiteral { value }, token, Type::STRING))
            }
            TokenKind::NumLit => {
                self.advance();
                match token.literal.parse::<f64>() {
                    Ok(value) => Some(Expr::new(NumLiteral { value }, token, Type::NUM)),
                    Err(err) => {
                        let message = format!("{}: {}", quote(&token.literal), err);
                        self.error_at(&token, &message);
                        None
                    }
                }
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                let value = token.kind == TokenKind::True;
                Some(Expr::new(BoolLiteral { value }, token, Type::BOOL))
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LCurly => self.parse_map_literal(),
            _ => {
                self.unexpected_left_token_error();
                None
            }
        }
    }

    fn parse_array_literal(&mut self) -> Option<Expr> {
        let token = self.cur().clone();
        self.advance();
        let mut multiline = self.parse_multiline_ws();
        let mut elements = Vec::new();
        while !matches!(self.cur().kind, TokenKind::RBracket | TokenKind::Eof) {
            elements.push(self.parse_expr_wss()?);
            multiline.push(MultilineItem::El);
            multiline.extend(self.parse_multiline_ws());
        }
        if !self.assert_token(TokenKind::RBracket) {
            return None;
        }
        self.advance();
        let id = self.next_id();
        self.formatting.multiline.insert(id, multiline);
        if elements.is_empty() {
            return Some(Expr::new(ArrayLiteral { elements, id }, token, Type::empty_array()));
        }
        let types: Vec<Type> = elements.iter().map(|e| e.t.clone()).collect();
        let elem = combine_types(&types);
        let elements = elements.into_iter().map(|e| wrap_any(e, &elem)).collect();
        Some(Expr::new(ArrayLiteral { elements, id }, token, Type::array(elem)))
    }

    fn parse_map_literal(&mut self) -> Option<Expr> {
        self.push_wss(false);
        let expr = self.parse_map();
        self.pop_wss();
        expr
    }

    fn parse_map(&mut self) -> Option<Expr> {
        let token = self.cur().clone();
        self.advance();
        let mut multiline = self.parse_multiline_ws();
        let mut pairs: Vec<(String, Expr)> = Vec::new();
        while !matches!(self.cur().kind, TokenKind::RCurly | TokenKind::Eof) {
            if self.cur().kind != TokenKind::Ident {
                let message = format!("expected map key, found {}", self.cur().format_details());
                self.error(&message);
                return None;
            }
            let key = self.cur().literal.clone();
            if pairs.iter().any(|(k, _)| *k == key) {
                let message = format!("duplicated map key {}", quote(&key));
                self.error(&message);
                return None;
            }
            self.advance();
            if !self.assert_token(TokenKind::Colon) {
                return None;
            }
            self.advance();
            let value = self.parse_expr_wss()?;
            pairs.push((key.clone(), value));
            multiline.push(MultilineItem::Key(key));
            multiline.extend(self.parse_multiline_ws());
        }
        if !self.assert_token(TokenKind::RCurly) {
            return None;
        }
        self.advance_wss();
        let id = self.next_id();
        self.formatting.multiline.insert(id, multiline);
        if pairs.is_empty() {
            return Some(Expr::new(MapLiteral { pairs, id }, token, Type::empty_map()));
        }
        let types: Vec<Type> = pairs.iter().map(|(_, v)| v.t.clone()).collect();
        let elem = combine_types(&types);
        let pairs = pairs
            .into_iter()
            .map(|(k, v)| (k, wrap_any(v, &elem)))
            .collect();
        Some(Expr::new(MapLiteral { pairs, id }, token, Type::map(elem)))
    }

    /// Consumes newlines, comments and whitespace inside array and map
    /// literals, recording them for the formatter.
    fn parse_multiline_ws(&mut self) -> Vec<MultilineItem> {
        let mut multiline = Vec::new();
        loop {
            match self.cur().kind {
                TokenKind::Nl => multiline.push(MultilineItem::Nl),
                TokenKind::Comment => {
                    let comment = format!("{}\n", self.cur().literal.trim());
                    multiline.push(MultilineItem::Comment(comment));
                    self.advance_wss();
                    self.assert_token(TokenKind::Nl);
                }
                TokenKind::Ws => {}
                _ => return multiline,
            }
            self.advance_wss();
        }
    }
}

/// Lets `+` join arrays whose element types differ only where one side is
/// a literal that can be re-typed to the other.
fn concat_operands(op: Operator, left: Expr, right: Expr) -> (Expr, Expr) {
    if op != Operator::Plus
        || left.t.name != TypeName::Array
        || right.t.name != TypeName::Array
        || left.t.matches(&right.t)
    {
        return (left, right);
    }
    if left.t.accepts(&right.t) {
        let t = left.t.clone();
        (left, wrap_any(right, &t))
    } else if right.t.accepts(&left.t) {
        let t = right.t.clone();
        (wrap_any(left, &t), right)
    } else {
        (left, right)
    }
}

/// Converts `value` to the representation expected by a slot of type
/// `target`: values flowing into `any` are boxed, composite literals are
/// re-typed element by element.
pub(super) fn wrap_any(mut value: Expr, target: &Type) -> Expr {
    if *target == value.t || target.is_generic() || target.is_empty() {
        return value;
    }
    if target.is_any() {
        value.infer();
        let token = value.token.clone();
        let value = Box::new(value);
        return Expr::new(AnyExpr { value }, token, Type::ANY);
    }
    if value.t.fixed || value.t.name != target.name {
        return value;
    }
    let elem = target.elem();
    match &mut value.kind {
        ExprKind::Array(arr) => {
            let elements = std::mem::take(&mut arr.elements);
            arr.elements = elements.into_iter().map(|e| wrap_any(e, &elem)).collect();
        }
        ExprKind::Map(map) => {
            let pairs = std::mem::take(&mut map.pairs);
            map.pairs = pairs
                .into_iter()
                .map(|(k, v)| (k, wrap_any(v, &elem)))
                .collect();
        }
        ExprKind::Binary(binary) => {
            wrap_boxed(&mut binary.left, target);
            wrap_boxed(&mut binary.right, target);
        }
        ExprKind::Group(group) => wrap_boxed(&mut group.expr, target),
        _ => return value,
    }
    value.t = target.unfixed();
    value
}

fn wrap_boxed(expr: &mut Box<Expr>, target: &Type) {
    let placeholder = Expr::new(BoolLiteral { value: false }, expr.token.clone(), Type::BOOL);
    let inner = std::mem::replace(expr.as_mut(), placeholder);
    **expr = wrap_any(inner, target);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ast::Var, parser::scope::ScopeKind, parser::tests::test_builtins};

    /// Parses `input` as a single expression with a few variables in scope.
    fn parse_expr(input: &str) -> Result<String, String> {
        let builtins = test_builtins();
        let mut parser = Parser::new(input, &builtins);
        parser.scopes.push_with_return_type(ScopeKind::Program, None);
        let vars = [
            ("n", Type::NUM),
            ("s", Type::STRING),
            ("b", Type::BOOL),
            ("a", Type::ANY),
            ("arr", Type::array(Type::NUM)),
            ("map", Type::map(Type::NUM)),
            ("nested", Type::map(Type::array(Type::STRING))),
        ];
        for (name, t) in vars {
            parser.scopes.set(Var::builtin(name, t));
        }
        parser.advance_to(0);
        parser.advance_if_ws();
        let expr = parser.parse_top_level_expr();
        match (expr, parser.errors.first()) {
            (_, Some(err)) => Err(err.to_string()),
            (Some(expr), None) => Ok(expr.to_string()),
            (None, None) => Err("no expression".into()),
        }
    }

    #[test]
    fn precedence() {
        let tests = [
            ("1 + 2 * 3", "(1+(2*3))"),
            ("(1 + 2) * 3", "((1+2)*3)"),
            ("1 + 2 + 3", "((1+2)+3)"),
            ("-n * 2", "((-n)*2)"),
            ("!b and b or !b", "(((!b) and b) or (!b))"),
            ("n < 1 == b", "((n<1)==b)"),
            ("1 * 2 % 3", "((1*2)%3)"),
            ("s + \"x\" == \"ab\"", "((s+\"x\")==\"ab\")"),
            ("arr[1] + map.key", "((arr[1])+(map.key))"),
            ("nested.a[0]", "((nested.a)[0])"),
            ("map.key + 1", "((map.key)+1)"),
            ("map.key * map.key", "((map.key)*(map.key))"),
            ("-(1 + n)", "(-(1+n))"),
            ("a.(num) + 1", "((a.(num))+1)"),
        ];
        for (input, want) in tests {
            assert_eq!(parse_expr(input), Ok(want.to_string()), "input: {:?}", input);
        }
    }

    #[test]
    fn literals_and_slices() {
        let tests = [
            ("[1 2 3]", "[1, 2, 3]"),
            ("[1 (n + 1) n]", "[1, (n+1), n]"),
            ("[]", "[]"),
            ("{a:1 b:n}", "{a:1, b:n}"),
            ("{}", "{}"),
            ("[1 \"x\"]", "[any(1), any(\"x\")]"),
            ("[[1] []]", "[[1], []]"),
            ("arr[1:]", "(arr[1:])"),
            ("arr[:2]", "(arr[:2])"),
            ("s[1:-1]", "(s[1:(-1)])"),
            ("arr + [1]", "(arr+[1])"),
            ("len arr", "len(any(arr))"),
            ("1.5", "1.5"),
        ];
        for (input, want) in tests {
            assert_eq!(parse_expr(input), Ok(want.to_string()), "input: {:?}", input);
        }
    }

    #[test]
    fn expression_errors() {
        let tests = [
            ("1 +", "line 1 column 4: unexpected end of input"),
            ("(1+)2", "line 1 column 4: unexpected \")\""),
            ("[1(]", "line 1 column 4: unexpected \"]\""),
            ("[1)", "line 1 column 3: unexpected \")\""),
            ("[3 +5]", "line 1 column 4: unexpected whitespace before \"+\""),
            ("[3+ 5]", "line 1 column 3: unexpected whitespace after \"+\""),
            ("- 5", "line 1 column 1: unexpected whitespace after \"-\""),
            ("-b", "line 1 column 1: \"-\" unary expects num type, found bool"),
            ("!n", "line 1 column 1: \"!\" unary expects bool type, found num"),
            ("1 + \"a\"", "line 1 column 3: mismatched type for +: num, string"),
            ("[1] + [false]", "line 1 column 5: mismatched type for +: []num, []bool"),
            ("b + b", "line 1 column 3: \"+\" takes num, string or array type, found bool"),
            ("s - s", "line 1 column 3: \"-\" takes num type, found string"),
            ("b < b", "line 1 column 3: \"<\" takes num or string type, found bool"),
            ("n and n", "line 1 column 3: \"and\" takes bool type, found num"),
            ("n[0]", "line 1 column 2: only array, string and map type can be indexed, found num"),
            ("arr [0]", "line 1 column 5: unexpected whitespace before \"[\""),
            ("arr[\"a\"]", "line 1 column 4: array index expects num, found string"),
            ("s[b]", "line 1 column 2: string index expects num, found bool"),
            ("map[1]", "line 1 column 4: map index expects string, found num"),
            ("map[1:2]", "line 1 column 4: only array and string can be sliced, found {}num"),
            ("map .b", "line 1 column 5: unexpected whitespace before \".\""),
            ("map. b", "line 1 column 4: unexpected whitespace after \".\""),
            ("arr.b", "line 1 column 4: field access with \".\" expects map type, found []num"),
            ("a .(num)", "line 1 column 3: unexpected whitespace before \".\""),
            ("a.(x)", "line 1 column 2: invalid type in type assertion of \"a\""),
            ("a.(any)", "line 1 column 2: cannot type assert to type any"),
            ("n.(num)", "line 1 column 2: value of type assertion must be of type any, not num"),
            ("{a:1 a:2}", "line 1 column 6: duplicated map key \"a\""),
            ("{:a}", "line 1 column 2: expected map key, found \":\""),
            ("_", "line 1 column 1: anonymous variable \"_\" cannot be read"),
            ("x", "line 1 column 1: unknown variable name \"x\""),
            ("len print", "line 1 column 5: function call must be parenthesized: (print ...)"),
        ];
        for (input, want) in tests {
            assert_eq!(parse_expr(input), Err(want.to_string()), "input: {:?}", input);
        }
    }

    #[test]
    fn wrapping_retypes_literals() {
        let builtins = test_builtins();
        let mut parser = Parser::new("[1 [2]]", &builtins);
        parser.scopes.push_with_return_type(ScopeKind::Program, None);
        let expr = parser.parse_top_level_expr().map(|e| e.t);
        assert_eq!(expr, Some(Type::array(Type::ANY)));
        assert!(parser.errors.is_empty());

        let mut parser = Parser::new("[[] [1]]", &builtins);
        let expr = parser.parse_top_level_expr();
        let Some(Expr { kind: ExprKind::Array(arr), t, .. }) = expr else {
            panic!("expected array literal");
        };
        assert_eq!(t, Type::array(Type::array(Type::NUM)));
        assert_eq!(arr.elements[0].t, Type::array(Type::NUM));
    }

    #[test]
    fn multiline_literals_are_recorded() {
        let builtins = test_builtins();
        let mut parser = Parser::new("[1 // one\n 2\n\n]", &builtins);
        let expr = parser.parse_top_level_expr();
        let Some(Expr { kind: ExprKind::Array(arr), .. }) = expr else {
            panic!("expected array literal");
        };
        assert!(parser.errors.is_empty(), "{:?}", parser.errors);
        assert_eq!(
            parser.formatting.multiline[&arr.id],
            vec![
                MultilineItem::El,
                MultilineItem::Comment("// one\n".into()),
                MultilineItem::El,
                MultilineItem::Nl,
                MultilineItem::Nl,
            ]
        );
    }
}
