mod autocomplete;
mod end_to_end;
mod facets;
mod keywords;
mod lifecycle;
