//! Node kind declarations.
//!
//! [`NODE_KINDS`] mirrors the node list of the source language's AST module:
//! every kind the parser may hand us, with its attributes in positional order.
//! The implicit leading `line` attribute is not listed.

use super::Emission;

/// Kinds whose emission is written by hand in [`crate::compiler`].
pub(crate) const HAND_WRITTEN: &[(&str, &[&str], Emission)] = &[
    ("Module", &["doc", "node"], Emission::Module),
    ("Stmt", &["nodes"], Emission::Stmt),
    ("Discard", &["expr"], Emission::Discard),
    ("Const", &["value"], Emission::Const),
    ("List", &["nodes"], Emission::List),
    ("Tuple", &["nodes"], Emission::Tuple),
    ("Dict", &["items"], Emission::Dict),
    ("Printnl", &["nodes", "dest"], Emission::Printnl),
    (
        "Function",
        &["decorators", "name", "argnames", "defaults", "flags", "doc", "code"],
        Emission::Function,
    ),
    (
        "CallFunc",
        &["node", "args", "star_args", "dstar_args"],
        Emission::CallFunc,
    ),
    ("Name", &["name"], Emission::Name),
    ("Assign", &["nodes", "expr"], Emission::Assign),
    ("Import", &["names"], Emission::Import),
];

pub(crate) const NODE_KINDS: &[(&str, &[&str])] = &[
    ("Module", &["doc", "node"]),
    ("Stmt", &["nodes"]),
    ("Decorators", &["nodes"]),
    (
        "Function",
        &["decorators", "name", "argnames", "defaults", "flags", "doc", "code"],
    ),
    ("Lambda", &["argnames", "defaults", "flags", "code"]),
    ("Class", &["name", "bases", "doc", "code"]),
    ("Pass", &[]),
    ("Break", &[]),
    ("Continue", &[]),
    ("For", &["assign", "list", "body", "else_"]),
    ("While", &["test", "body", "else_"]),
    ("With", &["expr", "vars", "body"]),
    ("If", &["tests", "else_"]),
    ("IfExp", &["test", "then", "else_"]),
    ("Exec", &["expr", "locals", "globals"]),
    ("From", &["modname", "names", "level"]),
    ("Import", &["names"]),
    ("Raise", &["expr1", "expr2", "expr3"]),
    ("TryFinally", &["body", "final"]),
    ("TryExcept", &["body", "handlers", "else_"]),
    ("Return", &["value"]),
    ("Yield", &["value"]),
    ("Const", &["value"]),
    ("Print", &["nodes", "dest"]),
    ("Printnl", &["nodes", "dest"]),
    ("Discard", &["expr"]),
    ("AugAssign", &["node", "op", "expr"]),
    ("Assign", &["nodes", "expr"]),
    ("AssTuple", &["nodes"]),
    ("AssList", &["nodes"]),
    ("AssName", &["name", "flags"]),
    ("AssAttr", &["expr", "attrname", "flags"]),
    ("ListComp", &["expr", "quals"]),
    ("ListCompFor", &["assign", "list", "ifs"]),
    ("ListCompIf", &["test"]),
    ("GenExpr", &["code"]),
    ("GenExprInner", &["expr", "quals"]),
    ("GenExprFor", &["assign", "iter", "ifs"]),
    ("GenExprIf", &["test"]),
    ("List", &["nodes"]),
    ("Dict", &["items"]),
    ("Not", &["expr"]),
    ("Compare", &["expr", "ops"]),
    ("Name", &["name"]),
    ("Global", &["names"]),
    ("Backquote", &["expr"]),
    ("Getattr", &["expr", "attrname"]),
    ("CallFunc", &["node", "args", "star_args", "dstar_args"]),
    ("Keyword", &["name", "expr"]),
    ("Subscript", &["expr", "flags", "subs"]),
    ("Ellipsis", &[]),
    ("Sliceobj", &["nodes"]),
    ("Slice", &["expr", "flags", "lower", "upper"]),
    ("Assert", &["test", "fail"]),
    ("Tuple", &["nodes"]),
    ("Or", &["nodes"]),
    ("And", &["nodes"]),
    ("Bitor", &["nodes"]),
    ("Bitxor", &["nodes"]),
    ("Bitand", &["nodes"]),
    ("LeftShift", &["left", "right"]),
    ("RightShift", &["left", "right"]),
    ("Add", &["left", "right"]),
    ("Mul", &["left", "right"]),
    ("Sub", &["left", "right"]),
    ("Power", &["left", "right"]),
    ("Div", &["left", "right"]),
    ("Mod", &["left", "right"]),
    ("FloorDiv", &["left", "right"]),
    ("UnaryAdd", &["expr"]),
    ("UnarySub", &["expr"]),
    ("Invert", &["expr"]),
];
