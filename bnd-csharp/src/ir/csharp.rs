//! Source-text renderer: IR → C#.

use std::fmt::Write as _;

use super::*;

/// Render a whole file. Pure function of the IR.
pub fn render(file: &CodeFile) -> String {
    let mut w = Writer::default();
    for line in &file.header {
        w.line(&comment_line(line));
    }
    if !file.header.is_empty() {
        w.blank();
    }
    for using in &file.usings {
        w.line(&format!("using {using};"));
    }
    if !file.usings.is_empty() {
        w.blank();
    }
    for (i, ns) in file.namespaces.iter().enumerate() {
        if i > 0 {
            w.blank();
        }
        w.line(&format!("namespace {}", ns.name));
        w.open();
        for (j, ty) in ns.types.iter().enumerate() {
            if j > 0 {
                w.blank();
            }
            render_type(&mut w, ty);
        }
        w.close();
    }
    w.finish()
}

/// `int`, `cef_app_t*`, `delegate* unmanaged[Cdecl]<int, void>`.
pub fn type_ref(ty: &TypeRef) -> String {
    match ty {
        TypeRef::Void => "void".to_string(),
        TypeRef::Named(n) => n.clone(),
        TypeRef::Pointer(inner) => format!("{}*", type_ref(inner)),
        TypeRef::Array(inner) => format!("{}[]", type_ref(inner)),
        TypeRef::Generic(name, args) => {
            let args: Vec<String> = args.iter().map(type_ref).collect();
            format!("{name}<{}>", args.join(", "))
        }
        TypeRef::FunctionPointer {
            convention,
            params,
            ret,
        } => {
            let mut parts: Vec<String> = params.iter().map(type_ref).collect();
            parts.push(type_ref(ret));
            format!("delegate* unmanaged[{convention}]<{}>", parts.join(", "))
        }
    }
}

pub fn modifiers(m: Modifiers) -> String {
    const ORDER: &[(Modifiers, &str)] = &[
        (Modifiers::PUBLIC, "public"),
        (Modifiers::PRIVATE, "private"),
        (Modifiers::PROTECTED, "protected"),
        (Modifiers::INTERNAL, "internal"),
        (Modifiers::STATIC, "static"),
        (Modifiers::SEALED, "sealed"),
        (Modifiers::ABSTRACT, "abstract"),
        (Modifiers::READONLY, "readonly"),
        (Modifiers::EXTERN, "extern"),
        (Modifiers::UNSAFE, "unsafe"),
        (Modifiers::VIRTUAL, "virtual"),
        (Modifiers::OVERRIDE, "override"),
        (Modifiers::PARTIAL, "partial"),
    ];
    ORDER
        .iter()
        .filter(|(flag, _)| m.contains(*flag))
        .map(|(_, word)| *word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn with_modifiers(m: Modifiers, rest: &str) -> String {
    let mods = modifiers(m);
    if mods.is_empty() {
        rest.to_string()
    } else {
        format!("{mods} {rest}")
    }
}

fn comment_line(line: &str) -> String {
    if line.is_empty() {
        "//".to_string()
    } else {
        format!("// {line}")
    }
}

fn params(params: &[Param]) -> String {
    params
        .iter()
        .map(|p| {
            let prefix = match p.direction {
                ParamDirection::In => "",
                ParamDirection::Ref => "ref ",
                ParamDirection::Out => "out ",
            };
            format!("{prefix}{} {}", type_ref(&p.ty), p.name)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_doc(w: &mut Writer, comment: &[String]) {
    if comment.is_empty() {
        return;
    }
    w.line("/// <summary>");
    for line in comment {
        if line.is_empty() {
            w.line("///");
        } else {
            w.line(&format!("/// {line}"));
        }
    }
    w.line("/// </summary>");
}

fn render_attributes(w: &mut Writer, attributes: &[Attribute]) {
    for attr in attributes {
        let text = if attr.args.is_empty() {
            format!("[{}]", attr.name)
        } else {
            format!("[{}({})]", attr.name, attr.args.join(", "))
        };
        match &attr.unless {
            Some(symbol) => {
                w.directive(&format!("#if !{symbol}"));
                w.line(&text);
                w.directive("#endif");
            }
            None => w.line(&text),
        }
    }
}

fn render_type(w: &mut Writer, ty: &TypeDecl) {
    render_doc(w, &ty.comment);
    render_attributes(w, &ty.attributes);
    let keyword = match ty.kind {
        TypeKind::Class => "class",
        TypeKind::Struct => "struct",
        TypeKind::Interface => "interface",
        TypeKind::Enum => "enum",
    };
    let mut head = with_modifiers(ty.modifiers, &format!("{keyword} {}", ty.name));
    let mut bases: Vec<String> = Vec::new();
    if let Some(base) = &ty.base {
        bases.push(type_ref(base));
    }
    bases.extend(ty.interfaces.iter().map(type_ref));
    if !bases.is_empty() {
        let _ = write!(head, " : {}", bases.join(", "));
    }
    w.line(&head);
    w.open();
    render_members(w, &ty.name, &ty.members);
    w.close();
}

fn render_members(w: &mut Writer, type_name: &str, members: &[Member]) {
    let mut previous: Option<&Member> = None;
    for member in members {
        if let Some(prev) = previous
            && needs_separator(prev, member)
        {
            w.blank();
        }
        render_member(w, type_name, member);
        previous = Some(member);
    }
}

/// Fields and enum items pack together; everything else is spaced out.
fn needs_separator(prev: &Member, next: &Member) -> bool {
    !matches!(
        (prev, next),
        (Member::Field(_), Member::Field(_)) | (Member::EnumItem(_), Member::EnumItem(_))
    )
}

fn render_member(w: &mut Writer, type_name: &str, member: &Member) {
    match member {
        Member::Field(f) => render_field(w, f),
        Member::Method(m) => render_method(w, m),
        Member::Constructor(c) => render_constructor(w, type_name, c),
        Member::Property(p) => render_property(w, p),
        Member::Delegate(d) => {
            render_attributes(w, &d.attributes);
            let text = format!(
                "delegate {} {}({});",
                type_ref(&d.ret),
                d.name,
                params(&d.params)
            );
            w.line(&with_modifiers(d.modifiers, &text));
        }
        Member::EnumItem(item) => {
            render_doc(w, &item.comment);
            w.line(&format!("{} = {},", item.name, item.value));
        }
        Member::Comment(lines) => {
            for line in lines {
                w.line(&comment_line(line));
            }
        }
        Member::Conditional(group) => {
            w.directive(&format!("#if {}", group.symbol));
            render_members(w, type_name, &group.then);
            if !group.otherwise.is_empty() {
                w.directive("#else");
                render_members(w, type_name, &group.otherwise);
            }
            w.directive("#endif");
        }
    }
}

fn render_field(w: &mut Writer, f: &Field) {
    for line in &f.comment {
        w.line(&comment_line(line));
    }
    render_attributes(w, &f.attributes);
    let decl = match f.fixed_len {
        Some(len) => format!("fixed {} {}[{len}]", type_ref(&f.ty), f.name),
        None => format!("{} {}", type_ref(&f.ty), f.name),
    };
    let decl = match &f.initializer {
        Some(init) => format!("{decl} = {init};"),
        None => format!("{decl};"),
    };
    w.line(&with_modifiers(f.modifiers, &decl));
}

fn render_method(w: &mut Writer, m: &Method) {
    render_doc(w, &m.comment);
    render_attributes(w, &m.attributes);
    let name = match &m.explicit_interface {
        Some(iface) => format!("{}.{}", type_ref(iface), m.name),
        None => m.name.clone(),
    };
    let sig = format!("{} {name}({})", type_ref(&m.ret), params(&m.params));
    match &m.body {
        Some(body) => {
            w.line(&with_modifiers(m.modifiers, &sig));
            render_body(w, body);
        }
        None => w.line(&with_modifiers(m.modifiers, &format!("{sig};"))),
    }
}

fn render_constructor(w: &mut Writer, type_name: &str, c: &Constructor) {
    let sig = format!("{type_name}({})", params(&c.params));
    w.line(&with_modifiers(c.modifiers, &sig));
    if let Some(init) = &c.initializer {
        w.indent += 1;
        w.line(&format!(": {init}"));
        w.indent -= 1;
    }
    render_body(w, &c.body);
}

fn render_property(w: &mut Writer, p: &Property) {
    render_doc(w, &p.comment);
    render_attributes(w, &p.attributes);
    w.line(&with_modifiers(p.modifiers, &format!("{} {}", type_ref(&p.ty), p.name)));
    w.open();
    if let Some(getter) = &p.getter {
        w.line("get");
        render_body(w, getter);
    }
    if let Some(setter) = &p.setter {
        w.line("set");
        render_body(w, setter);
    }
    w.close();
}

fn render_body(w: &mut Writer, body: &[Stmt]) {
    w.open();
    render_stmts(w, body);
    w.close();
}

fn render_stmts(w: &mut Writer, stmts: &[Stmt]) {
    for stmt in stmts {
        match stmt {
            Stmt::Line(text) => w.line(text),
            Stmt::Blank => w.blank(),
            Stmt::Block { head, body } => {
                w.line(head);
                render_body(w, body);
            }
            Stmt::Conditional {
                symbol,
                then,
                otherwise,
            } => {
                w.directive(&format!("#if {symbol}"));
                render_stmts(w, then);
                if !otherwise.is_empty() {
                    w.directive("#else");
                    render_stmts(w, otherwise);
                }
                w.directive("#endif");
            }
        }
    }
}

/// Line writer with tab indentation.
#[derive(Default)]
struct Writer {
    out: String,
    indent: usize,
}

impl Writer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push('\t');
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    /// Preprocessor lines start at column 0.
    fn directive(&mut self, text: &str) {
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn open(&mut self) {
        self.line("{");
        self.indent += 1;
    }

    fn close(&mut self) {
        self.indent = self.indent.saturating_sub(1);
        self.line("}");
    }

    fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditional_group_wraps_members() {
        let mut ty = TypeDecl::new("Demo", TypeKind::Class, Modifiers::PUBLIC);
        ty.members.push(Member::Conditional(ConditionalGroup {
            symbol: "LEGACY".to_string(),
            then: vec![Member::Field(Field::new(
                "a",
                TypeRef::named("int"),
                Modifiers::PRIVATE,
            ))],
            otherwise: Vec::new(),
        }));
        let file = CodeFile {
            header: Vec::new(),
            usings: Vec::new(),
            namespaces: vec![Namespace {
                name: "N".to_string(),
                types: vec![ty],
            }],
        };
        let text = render(&file);
        assert!(text.contains("#if LEGACY\n\t\tprivate int a;\n#endif\n"), "{text}");
    }

    #[test]
    fn function_pointer_spelling() {
        let ty = TypeRef::FunctionPointer {
            convention: "Cdecl".to_string(),
            params: vec![TypeRef::named("cef_app_t").pointer()],
            ret: Box::new(TypeRef::Void),
        };
        assert_eq!(type_ref(&ty), "delegate* unmanaged[Cdecl]<cef_app_t*, void>");
    }
}
