//! Rendering of filters into the marketplace's dotted query syntax.
//!
//! The syntax nests `(C.Field.Value._.…)` groups joined by `._.`; parentheses,
//! dots and underscores are structure and stay verbatim while every value is
//! percent-encoded.

use urlencoding::encode;

use crate::error::CompileError;
use crate::models::SearchFilter;

/// Sell type of regular (non-lease, non-rental) listings
const SELL_TYPE: &str = "일반";

/// Render a completed filter into the query expression used by the search endpoint.
///
/// Deterministic: equal filters always produce byte-identical output.
pub fn compile(filter: &SearchFilter) -> Result<String, CompileError> {
    let manufacturer = required("manufacturer", &filter.manufacturer)?;
    let model_group = required("model_group", &filter.model_group)?;
    let model = required("model", &filter.model)?;
    let trim = required("trim", &filter.trim)?;

    if filter.year_from > filter.year_to {
        return Err(CompileError::InvalidRange("year"));
    }
    if filter.mileage_from > filter.mileage_to {
        return Err(CompileError::InvalidRange("mileage"));
    }

    let mut q = format!(
        "(And.Hidden.N._.SellType.{}._.\
         (C.CarType.A._.\
         (C.Manufacturer.{}._.\
         (C.ModelGroup.{}._.\
         (C.Model.{}._.BadgeGroup.{}.))))_.\
         Year.range({}00..{}99)._.\
         Mileage.range({}).",
        encode(SELL_TYPE),
        encode(manufacturer),
        encode(model_group),
        encode(&marketplace_model_name(model)),
        encode(trim),
        filter.year_from,
        filter.year_to,
        mileage_range(filter.mileage_from, filter.mileage_to),
    );

    if let Some(color) = filter.color_predicate() {
        q.push_str(&format!("_.Color.{}.", encode(color)));
    }
    q.push(')');

    Ok(q)
}

/// Navigation query selecting the catalog path in `prefix`
/// (manufacturer, model group, model). `None` for deeper prefixes.
pub fn nav_query(prefix: &[String]) -> Option<String> {
    let sell = encode(SELL_TYPE);
    let q = match prefix {
        [] => format!("(And.Hidden.N._.SellType.{}._.CarType.A.)", sell),
        [m] => format!(
            "(And.Hidden.N._.SellType.{}._.(C.CarType.A._.Manufacturer.{}.))",
            sell,
            encode(m)
        ),
        [m, g] => format!(
            "(And.Hidden.N._.SellType.{}._.(C.CarType.A._.(C.Manufacturer.{}._.ModelGroup.{}.)))",
            sell,
            encode(m),
            encode(g)
        ),
        [m, g, model] => format!(
            "(And.Hidden.N._.(C.CarType.A._.(C.Manufacturer.{}._.(C.ModelGroup.{}._.Model.{}.))))",
            encode(m),
            encode(g),
            encode(model)
        ),
        _ => return None,
    };
    Some(q)
}

fn required<'a>(name: &'static str, value: &'a str) -> Result<&'a str, CompileError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(CompileError::MissingField(name))
    } else {
        Ok(trimmed)
    }
}

/// Zero lower bound means "no floor" and is left out.
fn mileage_range(from: u32, to: u32) -> String {
    if from == 0 {
        format!("..{}", to)
    } else {
        format!("{}..{}", from, to)
    }
}

/// The search index stores generation codes with a trailing underscore:
/// `쏘나타 (DN8)` is queried as `쏘나타(DN8_)`.
fn marketplace_model_name(model: &str) -> String {
    match (model.rfind('('), model.ends_with(')')) {
        (Some(open), true) => {
            let base = model[..open].trim_end();
            let code = &model[open + 1..model.len() - 1];
            format!("{}({}_)", base, code)
        }
        _ => model.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sonata() -> SearchFilter {
        SearchFilter {
            manufacturer: "현대".into(),
            model_group: "소나타".into(),
            model: "DN8".into(),
            trim: "가솔린".into(),
            year_from: 2020,
            year_to: 2023,
            mileage_from: 0,
            mileage_to: 50000,
            color: Some("any".into()),
        }
    }

    #[test]
    fn test_compile_is_deterministic() {
        let a = compile(&sonata()).unwrap();
        let b = compile(&sonata().clone()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_mileage_floor_is_omitted() {
        let q = compile(&sonata()).unwrap();
        assert!(q.contains("Mileage.range(..50000)."), "{}", q);
        assert!(q.contains("Year.range(202000..202399)"), "{}", q);
        assert!(!q.contains("Color."));
    }

    #[test]
    fn test_nonzero_mileage_floor_and_color() {
        let mut f = sonata();
        f.mileage_from = 10000;
        f.color = Some("흰색".into());
        let q = compile(&f).unwrap();
        assert!(q.contains("Mileage.range(10000..50000)."));
        assert!(q.ends_with(&format!("_.Color.{}.)", encode("흰색"))));
    }

    #[test]
    fn test_values_are_encoded_structure_is_not() {
        let q = compile(&sonata()).unwrap();
        assert!(q.starts_with("(And.Hidden.N._.SellType.%EC%9D%BC%EB%B0%98._.(C.CarType.A._."));
        assert!(q.contains(&format!("(C.Manufacturer.{}._.", encode("현대"))));
        assert!(!q.contains("현대"));
        assert!(q.ends_with(')'));
    }

    #[test]
    fn test_missing_fields_fail() {
        for field in ["manufacturer", "model_group", "model", "trim"] {
            let mut f = sonata();
            match field {
                "manufacturer" => f.manufacturer = "  ".into(),
                "model_group" => f.model_group.clear(),
                "model" => f.model.clear(),
                _ => f.trim.clear(),
            }
            assert_eq!(compile(&f), Err(CompileError::MissingField(field)));
        }
    }

    #[test]
    fn test_reversed_ranges_fail() {
        let mut f = sonata();
        f.year_from = 2024;
        assert_eq!(compile(&f), Err(CompileError::InvalidRange("year")));

        let mut f = sonata();
        f.mileage_from = 60000;
        assert_eq!(compile(&f), Err(CompileError::InvalidRange("mileage")));
    }

    #[test]
    fn test_generation_code_gets_marketplace_suffix() {
        assert_eq!(marketplace_model_name("쏘나타 (DN8)"), "쏘나타(DN8_)");
        assert_eq!(marketplace_model_name("DN8"), "DN8");

        let mut f = sonata();
        f.model = "쏘나타 (DN8)".into();
        let q = compile(&f).unwrap();
        assert!(q.contains(&format!("(C.Model.{}._.", encode("쏘나타(DN8_)"))));
    }

    #[test]
    fn test_nav_query_depths() {
        let root = nav_query(&[]).unwrap();
        assert!(root.ends_with("._.CarType.A.)"));

        let m = nav_query(&["현대".to_string()]).unwrap();
        assert!(m.contains(&format!("Manufacturer.{}.))", encode("현대"))));

        let prefix: Vec<String> = vec!["현대".into(), "쏘나타".into(), "쏘나타 (DN8)".into()];
        let trims = nav_query(&prefix).unwrap();
        assert!(!trims.contains("SellType"));

        let too_deep: Vec<String> = vec!["a".into(), "b".into(), "c".into(), "d".into()];
        assert!(nav_query(&too_deep).is_none());
    }
}
