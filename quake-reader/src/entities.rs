//! Parser for the entity lump: a sequence of `{ "key" "value" ... }` blocks.

use std::collections::HashMap;

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::*;
use nom::multi::{fold_many0, many0};
use nom::sequence::{delimited, preceded, tuple};
use nom::IResult;
use nom::{combinator::*, Parser};

/// Parses every entity. Keys are lower-cased; values are kept as written.
pub fn parse(
    input: &str,
) -> Result<Vec<HashMap<String, String>>, nom::Err<nom::error::Error<&str>>> {
    let (input, entities) = many0(entity)(input)?;
    let (input, _) = whitespace0(input)?;
    let (_, _) = eof(input)?;

    Ok(entities)
}

fn whitespace_char(input: &str) -> IResult<&str, char> {
    satisfy(|c| c.is_whitespace())(input)
}

fn non_whitespace_char(input: &str) -> IResult<&str, char> {
    satisfy(|c| !c.is_whitespace())(input)
}

fn line_comment(input: &str) -> IResult<&str, &str> {
    recognize(tuple((tag("//"), many0(none_of("\r\n")), line_ending)))(input)
}

fn whitespace0(input: &str) -> IResult<&str, &str> {
    recognize(many0(alt((
        recognize(whitespace_char),
        recognize(line_comment),
    ))))(input)
}

fn string(input: &str) -> IResult<&str, &str> {
    preceded(
        whitespace0,
        alt((
            delimited(char('"'), recognize(many0(none_of("\""))), char('"')),
            recognize(tuple((none_of("{}\""), many0(non_whitespace_char)))),
        )),
    )(input)
}

fn operator(c: char) -> impl Fn(&str) -> IResult<&str, char> {
    move |input| preceded(whitespace0, char(c))(input)
}

fn key_value(input: &str) -> IResult<&str, (&str, &str)> {
    tuple((string, string)).parse(input)
}

fn entity(input: &str) -> IResult<&str, HashMap<String, String>> {
    let (input, _) = operator('{')(input)?;
    let (input, key_values) = fold_many0(
        key_value,
        HashMap::new,
        |mut key_values, (key, value)| {
            key_values.insert(key.to_lowercase(), value.to_string());
            key_values
        },
    )(input)?;
    let (input, _) = operator('}')(input)?;

    IResult::Ok((input, key_values))
}
