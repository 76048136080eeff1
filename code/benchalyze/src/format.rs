/// Generic formatting code for a set of data extracted from a data structure to be presented
/// columnar, as csv, or as json, and (except for json) with or without a header.
use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};
use std::io;

pub struct Help {
    pub fields: Vec<String>,
    pub aliases: Vec<(String, Vec<String>)>,
    pub defaults: String,
}

pub fn maybe_help<F>(fmt: &Option<String>, f: F) -> bool
where
    F: Fn() -> Help,
{
    if let Some(ref s) = fmt {
        if s.starts_with("help") {
            let mut help = f();
            println!("Syntax:\n  --fmt=(field|alias|control),...");
            println!("\nFields:");
            help.fields.sort();
            for f in help.fields {
                println!("  {f}");
            }
            if !help.aliases.is_empty() {
                println!("\nAliases:");
                help.aliases.sort();
                for (name, mut fields) in help.aliases {
                    fields.sort();
                    let explication = fields.join(",");
                    println!("  {name} --> {explication}");
                }
            }
            println!("\nDefaults:\n  {}", help.defaults);
            println!("\nControl:\n  csv\n  fixed\n  json\n  awk\n  header\n  noheader\n  tag:<tagvalue>");
            return true;
        }
    }
    false
}

/// Return a vector of the known fields in `spec` wrt the formatters, and a HashSet of any other
/// strings found in `spec`.  It returns an error if zero output fields were selected.

pub fn parse_fields<'a, FmtT>(
    spec: &'a str,
    formatters: &HashMap<String, FmtT>,
    aliases: &'a HashMap<String, Vec<String>>,
) -> Result<(Vec<&'a str>, HashSet<&'a str>)> {
    let mut others = HashSet::new();
    let mut fields = vec![];
    for x in spec.split(',') {
        if formatters.contains_key(x) {
            fields.push(x);
        } else if let Some(aliases) = aliases.get(x) {
            for alias in aliases {
                if formatters.contains_key(alias) {
                    fields.push(alias.as_ref());
                } else {
                    others.insert(alias.as_ref());
                }
            }
        } else {
            others.insert(x);
        }
    }
    if fields.is_empty() {
        bail!("No output fields were selected")
    }
    Ok((fields, others))
}

pub struct FormatOptions {
    pub tag: Option<String>,
    pub json: bool,   // json explicitly requested
    pub csv: bool,    // csv explicitly requested
    pub awk: bool,    // awk explicitly requested
    pub fixed: bool,  // fixed output explicitly requested
    pub header: bool, // true if nothing requested b/c fixed+header is default
}

pub fn standard_options(others: &HashSet<&str>) -> FormatOptions {
    let csv = others.contains("csv");
    let json = others.contains("json") && !csv;
    let awk = others.contains("awk") && !csv && !json;
    let fixed = others.contains("fixed") && !csv && !json && !awk;
    // json and awk get no header, even if one is requested
    let header = (!csv && !json && !awk && !others.contains("noheader"))
        || (csv && others.contains("header"));
    let mut tag: Option<String> = None;
    for x in others {
        if let Some(t) = x.strip_prefix("tag:") {
            tag = Some(t.to_string());
            break;
        }
    }
    FormatOptions {
        csv,
        json,
        awk,
        header,
        tag,
        fixed,
    }
}

/// The `fields` are the names of formatting functions to get from the `formatters`, these are
/// applied to the `data`.  Set `opts.header` to true to print a first row with field names as a
/// header (independent of csv).  Set `opts.csv` to true to get CSV output instead of fixed-format.
/// Set `opts.tag` to Some(s) to print a tag=s field in the output.

pub fn format_data<DataT, FmtT, CtxT>(
    output: &mut dyn io::Write,
    fields: &[&str],
    formatters: &HashMap<String, FmtT>,
    opts: &FormatOptions,
    data: Vec<DataT>,
    ctx: CtxT,
) -> Result<()>
where
    FmtT: Fn(&DataT, CtxT) -> String,
    CtxT: Copy,
{
    let fmts = fields
        .iter()
        .map(|kwd| match formatters.get(*kwd) {
            Some(f) => Ok(f),
            None => bail!("No formatter for '{kwd}'"),
        })
        .collect::<Result<Vec<&FmtT>>>()?;

    let mut cols = vec![Vec::<String>::new(); fields.len()];
    for x in &data {
        for (i, f) in fmts.iter().enumerate() {
            cols[i].push(f(x, ctx));
        }
    }

    if opts.csv {
        format_csv(output, fields, opts, cols)
    } else if opts.json {
        format_json(output, fields, opts, cols)
    } else if opts.awk {
        format_awk(output, opts, cols);
        Ok(())
    } else {
        format_fixed_width(output, fields, opts, cols);
        Ok(())
    }
}

fn format_fixed_width(output: &mut dyn io::Write, fields: &[&str], opts: &FormatOptions, cols: Vec<Vec<String>>) {
    // The column width is the max across all the entries in the column (including header,
    // if present).  If there's a tag, it is printed in the last column.
    let mut widths = vec![0; fields.len() + if opts.tag.is_some() { 1 } else { 0 }];
    let nrows = cols.first().map(|c| c.len()).unwrap_or(0);

    if opts.header {
        for (i, kwd) in fields.iter().enumerate() {
            widths[i] = usize::max(widths[i], kwd.len());
        }
        if opts.tag.is_some() {
            widths[fields.len()] = usize::max(widths[fields.len()], "tag".len());
        }
    }
    for (col, c) in cols.iter().enumerate() {
        for v in c {
            widths[col] = usize::max(widths[col], v.len());
        }
    }
    if let Some(ref tag) = opts.tag {
        widths[fields.len()] = usize::max(widths[fields.len()], tag.len());
    }

    // Header
    if opts.header {
        let mut s = "".to_string();
        for (i, kwd) in fields.iter().enumerate() {
            let w = widths[i];
            s += format!("{:w$}  ", kwd).as_str();
        }
        if opts.tag.is_some() {
            let w = widths[fields.len()];
            s += format!("{:w$}  ", "tag").as_str();
        }
        // Ignore errors here, they are common for broken pipelines
        let _ = output.write(s.trim_end().as_bytes());
        let _ = output.write(b"\n");
    }

    // Body
    for row in 0..nrows {
        let mut s = "".to_string();
        for (col, c) in cols.iter().enumerate() {
            let w = widths[col];
            s += format!("{:w$}  ", c[row]).as_str();
        }
        if let Some(ref tag) = opts.tag {
            let w = widths[fields.len()];
            s += format!("{:w$}  ", tag).as_str();
        }
        // Ignore errors here, they are common for broken pipelines
        let _ = output.write(s.trim_end().as_bytes());
        let _ = output.write(b"\n");
    }
}

fn format_csv(output: &mut dyn io::Write, fields: &[&str], opts: &FormatOptions, cols: Vec<Vec<String>>) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(output);
    let nrows = cols.first().map(|c| c.len()).unwrap_or(0);

    if opts.header {
        let mut out_fields = fields.iter().map(|kwd| kwd.to_string()).collect::<Vec<String>>();
        if opts.tag.is_some() {
            out_fields.push("tag".to_string());
        }
        writer.write_record(out_fields)?;
    }

    for row in 0..nrows {
        let mut out_fields = cols.iter().map(|c| c[row].clone()).collect::<Vec<String>>();
        if let Some(ref tag) = opts.tag {
            out_fields.push(tag.clone());
        }
        writer.write_record(out_fields)?;
    }

    writer.flush()?;
    Ok(())
}

fn format_json(output: &mut dyn io::Write, fields: &[&str], opts: &FormatOptions, cols: Vec<Vec<String>>) -> Result<()> {
    let nrows = cols.first().map(|c| c.len()).unwrap_or(0);
    let mut objects = vec![];
    for row in 0..nrows {
        let mut obj = serde_json::Map::new();
        for (col, c) in cols.iter().enumerate() {
            obj.insert(fields[col].to_string(), c[row].clone().into());
        }
        if let Some(ref tag) = opts.tag {
            obj.insert("tag".to_string(), tag.clone().into());
        }
        objects.push(serde_json::Value::Object(obj));
    }
    serde_json::to_writer(&mut *output, &objects)?;
    let _ = output.write(b"\n");
    Ok(())
}

// awk output: fields are space-separated and spaces are not allowed within fields, they
// are replaced by `_`.  Empty fields are printed as `_` so that the columns line up.

fn format_awk(output: &mut dyn io::Write, opts: &FormatOptions, cols: Vec<Vec<String>>) {
    let nrows = cols.first().map(|c| c.len()).unwrap_or(0);
    for row in 0..nrows {
        let mut line = "".to_string();
        for c in &cols {
            if !line.is_empty() {
                line += " ";
            }
            if c[row].is_empty() {
                line += "_";
            } else {
                line += c[row].replace(' ', "_").as_str();
            }
        }
        if let Some(ref tag) = opts.tag {
            if !line.is_empty() {
                line += " ";
            }
            line += tag;
        }
        line += "\n";
        let _ = output.write(line.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Datum = (i64, &'static str);
    type Fmt = &'static dyn Fn(&Datum, ()) -> String;

    fn format_n(d: &Datum, _: ()) -> String {
        d.0.to_string()
    }

    fn format_name(d: &Datum, _: ()) -> String {
        d.1.to_string()
    }

    fn formatters() -> (HashMap<String, Fmt>, HashMap<String, Vec<String>>) {
        let mut formatters: HashMap<String, Fmt> = HashMap::new();
        formatters.insert("n".to_string(), &format_n);
        formatters.insert("name".to_string(), &format_name);
        let mut aliases = HashMap::new();
        aliases.insert("all".to_string(), vec!["n".to_string(), "name".to_string()]);
        (formatters, aliases)
    }

    fn render(spec: &str) -> String {
        let (formatters, aliases) = formatters();
        let (fields, others) = parse_fields(spec, &formatters, &aliases).unwrap();
        let opts = standard_options(&others);
        let mut out = Vec::new();
        format_data(&mut out, &fields, &formatters, &opts, vec![(1, "a b"), (22, "c")], ()).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_parse_fields() {
        let (formatters, aliases) = formatters();
        let (fields, others) = parse_fields("all,csv,header", &formatters, &aliases).unwrap();
        assert!(fields == vec!["n", "name"]);
        assert!(others.contains("csv") && others.contains("header"));
        assert!(parse_fields("csv", &formatters, &aliases).is_err());
    }

    #[test]
    fn test_formats() {
        assert!(render("all,csv,header") == "n,name\n1,a b\n22,c\n");
        assert!(render("name,n") == "name  n\na b   1\nc     22\n");
        assert!(render("n,awk") == "1\n22\n");
        assert!(render("name,awk,tag:x") == "a_b x\nc x\n");
        assert!(render("n,json") == "[{\"n\":\"1\"},{\"n\":\"22\"}]\n");
    }
}
