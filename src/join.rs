/// Builds the projection used for a join when no SQL is supplied:
/// `select <fields..>, <by..>` plus ` from <table>` when a table is given.
pub fn synthesize_join_sql(fields: &[String], by: &[String], table: Option<&str>) -> String {
    let columns: Vec<&str> = fields.iter().chain(by.iter()).map(String::as_str).collect();
    let mut sql = format!("select {}", columns.join(", "));

    if let Some(table) = table {
        sql.push_str(" from ");
        sql.push_str(table);
    }

    sql
}
