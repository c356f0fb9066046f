//! Table catalogs: which CSMAR tables to download, grouped by category.
//!
//! Table and column names depend on the subscription and the language
//! setting. Check them with `csmar-explore --list-fields <TABLE>` (or run
//! `csmar-download --validate-only`) before a full download.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::models::TableSpec;

/// Stock code prefixes of A-share listings (Shenzhen main board, ChiNext, Shanghai)
pub const A_SHARE_PREFIXES: [&str; 3] = ["0", "3", "6"];

const STOCK_FIELD_CANDIDATES: [&str; 4] = ["stkcd", "symbol", "stkcode", "stockcode"];

/// One table entry of a category, keyed by a stable logical name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogTable {
    pub key: String,
    #[serde(flatten)]
    pub spec: TableSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub tables: Vec<CatalogTable>,
}

/// Ordered set of categories to download in one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub name: String,
    pub categories: Vec<Category>,
}

impl Catalog {
    /// Resolve a built-in catalog name or a path to a JSON catalog
    pub fn resolve(name_or_path: &str) -> Result<Self> {
        match name_or_path {
            "listed-firms" => Ok(Self::listed_firms()),
            "classifications" => Ok(Self::classifications()),
            path => Self::from_json_file(path),
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file {}", path.display()))?;
        let catalog: Catalog = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse catalog file {}", path.display()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Every table must be well formed and table keys unique per category
    pub fn validate(&self) -> Result<()> {
        for category in &self.categories {
            let mut keys = HashSet::new();
            for entry in &category.tables {
                entry
                    .spec
                    .validate()
                    .with_context(|| format!("Invalid table {}/{}", category.name, entry.key))?;
                if !keys.insert(entry.key.as_str()) {
                    return Err(anyhow!(
                        "Duplicate table key '{}' in category '{}'",
                        entry.key,
                        category.name
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn total_tables(&self) -> usize {
        self.categories.iter().map(|c| c.tables.len()).sum()
    }

    pub fn find(&self, category: &str, key: &str) -> Option<&TableSpec> {
        self.categories
            .iter()
            .find(|c| c.name == category)
            .and_then(|c| c.tables.iter().find(|t| t.key == key))
            .map(|t| &t.spec)
    }

    /// China Listed Firms Research Series: basic info, statements, ratios,
    /// governance, dividends and trading summaries.
    pub fn listed_firms() -> Self {
        Catalog {
            name: "listed-firms".to_string(),
            categories: vec![
                category(
                    "basic_info",
                    vec![
                        entry(
                            "yearly_profile",
                            TableSpec::new(
                                "STK_LISTEDCOINFOANL",
                                &[
                                    "Symbol", "ShortName_en", "EndDate", "LISTINGDATE",
                                    "LISTINGSTATE_EN", "IndustryCode", "IndustryName_EN",
                                    "RegisterAddress_EN", "OfficeAddress_EN", "RegisterCapital",
                                    "PROVINCE_EN", "CITY_EN", "Website",
                                ],
                                "Yearly statistics on listed firm basic information",
                            )
                            .with_stock_field("Symbol"),
                        ),
                        entry(
                            "profile_changes",
                            TableSpec::new(
                                "STK_LISTEDCOINFOCHG",
                                &[
                                    "Symbol", "AnnouncementDate", "ImplementDate",
                                    "ChangedItem_EN", "Value_Before_EN", "Value_After_EN",
                                ],
                                "Change log for listed firm basic information",
                            )
                            .with_stock_field("Symbol"),
                        ),
                        entry(
                            "listing_status_changes",
                            TableSpec::new(
                                "STK_ITEMCHANGE",
                                &[
                                    "Symbol", "DeclareDate", "ChangeDate", "ChangedItem_EN",
                                    "ValueBefore_EN", "ValueAfter_EN", "VALUE_EN",
                                ],
                                "Listing status changes (IPO, suspension, delisting)",
                            )
                            .with_stock_field("Symbol"),
                        ),
                        entry(
                            "industry_classification",
                            TableSpec::new(
                                "STK_INDUSTRYCLASS",
                                &[
                                    "Symbol", "IndustryClassificationID",
                                    "IndustryClassificationName_EN", "ImplementDate",
                                    "IndustryCode", "IndustryName_EN",
                                ],
                                "Industry classification assignments",
                            )
                            .with_stock_field("Symbol"),
                        ),
                        entry(
                            "industry_classification_annual",
                            TableSpec::new(
                                "STK_IndustryClassAnl",
                                &[
                                    "Symbol", "EndDate", "ShortName_EN",
                                    "IndustryClassificationID", "IndustryClassification_EN",
                                    "IndustryCode1", "IndustryName1_EN", "IndustryCode2",
                                    "IndustryName2_EN", "IndustryCode3", "IndustryName3_EN",
                                    "IndustryCode4", "IndustryName4_EN", "IndustryCode1CL",
                                    "IndustryName1CL_EN",
                                ],
                                "Annual multi-level industry classification assignments",
                            )
                            .with_stock_field("Symbol"),
                        ),
                        entry(
                            "company_staff",
                            TableSpec::new(
                                "STK_CompanyStaff",
                                &[
                                    "Symbol", "ShortName_EN", "EndDate", "EmployStructure_EN",
                                    "EmployDetail_EN", "Amount", "Unit_EN",
                                ],
                                "Personnel structure of listed companies",
                            )
                            .with_stock_field("Symbol"),
                        ),
                    ],
                ),
                category(
                    "financial_statements",
                    vec![
                        entry(
                            "balance_sheet",
                            TableSpec::new(
                                "FS_Combas",
                                &[
                                    "Stkcd", "Accper", "Typrep", "A001000000", "A001100000",
                                    "A001200000", "A002000000", "A003000000", "A004000000",
                                    "A001101000", "A001123000", "A001212000",
                                ],
                                "Balance sheet (general industry)",
                            ),
                        ),
                        entry(
                            "income_statement",
                            TableSpec::new(
                                "FS_Comins",
                                &[
                                    "Stkcd", "Accper", "Typrep", "B001100000", "B001101000",
                                    "B001200000", "B001300000", "B001000000", "B002000000",
                                    "B002000101", "B003000000", "B004000000", "B001216000",
                                    "B001211000",
                                ],
                                "Income statement (general industry)",
                            ),
                        ),
                        entry(
                            "cash_flow_indirect",
                            TableSpec::new(
                                "FS_Comscfi",
                                &[
                                    "Stkcd", "Accper", "Typrep", "D000100000", "D000200000",
                                    "D000101000", "D000102000", "D000103000", "D000109000",
                                    "D000110000", "D000113000", "D000114000", "D000115000",
                                ],
                                "Cash flow statement (indirect method)",
                            ),
                        ),
                    ],
                ),
                category(
                    "financial_indicators",
                    vec![
                        entry(
                            "solvency",
                            TableSpec::new(
                                "FI_T1",
                                &[
                                    "Stkcd", "Accper", "Typrep", "F010101A", "F010201A",
                                    "F010401A", "F011201A", "F011301A", "F011601A", "F011701A",
                                ],
                                "Solvency and leverage ratios",
                            ),
                        ),
                        entry(
                            "profitability",
                            TableSpec::new(
                                "FI_T5",
                                &[
                                    "Stkcd", "Accper", "Typrep", "F050101B", "F050501B",
                                    "F050801B", "F050901B", "F051201B", "F052301B", "F053401B",
                                ],
                                "Profitability metrics (ROA, ROE, margins)",
                            ),
                        ),
                        entry(
                            "growth",
                            TableSpec::new(
                                "FI_T8",
                                &[
                                    "Stkcd", "Accper", "Typrep", "F080601A", "F080602A",
                                    "F081001B", "F081002B", "F081601B", "F081701B", "F082601B",
                                ],
                                "Growth capability indicators",
                            ),
                        ),
                    ],
                ),
                category(
                    "corporate_governance",
                    vec![
                        entry(
                            "company_profile",
                            TableSpec::new(
                                "CG_Co",
                                &[
                                    "Stkcd", "Stknme_en", "ListedDate", "DelistedDate",
                                    "Regcap", "IndustryNameD_EN", "IndustryCodeD",
                                ],
                                "Corporate governance company profile",
                            ),
                        ),
                        entry(
                            "top_shareholders",
                            TableSpec::new(
                                "CG_Sharehold",
                                &[
                                    "Stkcd", "Reptdt", "S0101b_en", "S0201b", "S0301b",
                                    "S0401b_en", "S0501b",
                                ],
                                "Top shareholding structure",
                            ),
                        ),
                        entry(
                            "executive_profiles",
                            TableSpec::new(
                                "CG_Director",
                                &[
                                    "Stkcd", "Reptdt", "D0101b_en", "D0201b_en", "D0301b_en",
                                    "D0401b", "D0501b", "D1001b", "D1101b",
                                ],
                                "Director and executive profile data",
                            ),
                        ),
                        entry(
                            "ceo_changes",
                            TableSpec::new(
                                "CG_Ceo",
                                &[
                                    "Stkcd", "Annodt", "Chgdt", "Position", "Changtyp",
                                    "Name_en", "Dimreas",
                                ],
                                "Changes of chairpersons and general managers",
                            ),
                        ),
                        entry(
                            "management_salary",
                            TableSpec::new(
                                "CG_ManagerShareSalary",
                                &[
                                    "Symbol", "Enddate", "TotalNumber", "FemaleNumber",
                                    "DirectorNumber", "ManagerNumber", "Holdshares", "SumSalary",
                                    "Top3SumSalary",
                                ],
                                "Management shareholding and compensation statistics",
                            )
                            .with_stock_field("Symbol"),
                        ),
                        entry(
                            "subsidiary_profile",
                            TableSpec::new(
                                "STK_NotesSubJoint",
                                &[
                                    "Symbol", "EndDate", "RalatedParty_en", "CorporateIncomeTax_en",
                                    "RelationshipCode", "Relationship_en", "EstablishDate",
                                    "RegisterCapital", "RegisterAddress_en", "Sgnrgn",
                                    "EstablishWay_en", "DirectHoldingRatio", "IndirectHoldingRatio",
                                    "TotalAssets", "OperatingEvenue", "NetProfit", "ProfitParent",
                                    "TotalCost", "Currency_en", "ISExit", "AreaName_EN",
                                    "BusinessScope_EN", "Explanation_EN",
                                ],
                                "Subsidiaries and joint ventures disclosed in notes",
                            )
                            .with_stock_field("Symbol"),
                        ),
                        entry(
                            "subsidiary_disposals",
                            TableSpec::new(
                                "STK_NotesInvExit",
                                &[
                                    "Symbol", "EndDate", "RalatedParty_en", "Sgnrgn",
                                    "EstablishDate", "ExitMode", "DisposalDate", "DisposalPrice",
                                    "DisposalEquity", "Currency_en", "ShortName_EN",
                                ],
                                "Subsidiary investment exit disclosures",
                            )
                            .with_stock_field("Symbol"),
                        ),
                        entry(
                            "core_staff_roster",
                            TableSpec::new(
                                "CG_CoreStaffInfo",
                                &[
                                    "Enddate", "Symbol", "ShortName_EN", "Source", "PersonID",
                                    "FullName_EN", "Position_EN", "ServiceStartDate",
                                    "ServiceEndDate", "IsResign", "YearBeginningHoldShares",
                                    "EndDateHoldShares", "IsCoreTechStaff", "JudgeSource",
                                ],
                                "Core personnel roster with tenure and holdings",
                            )
                            .with_stock_field("Symbol"),
                        ),
                        entry(
                            "core_staff_statistics",
                            TableSpec::new(
                                "CG_CoreStaffSta",
                                &[
                                    "Enddate", "Symbol", "ShortName_EN", "Source", "CoreStaffSum",
                                    "CoreTechStaffSum", "CoreBusStaffSum",
                                ],
                                "Summary counts of core staff by role",
                            )
                            .with_stock_field("Symbol"),
                        ),
                        entry(
                            "governance_yearly_summary",
                            TableSpec::new(
                                "CG_Ybasic",
                                &[
                                    "Stkcd", "Reptdt", "Annodt", "Y0301b", "Y0401b", "Y0501b",
                                    "Y0601b", "Y0701b", "Y0801b_en", "Y0901b_en", "Y1001b",
                                    "Y1401b", "Y1701a", "Y1701b", "Y1701c", "Y1801b",
                                    "ChairmanID", "GeneralManagerID", "ChairmanHoldshares",
                                    "ChairmanHoldsharesRatio", "ManagerHoldshares",
                                    "ManagerHoldsharesRatio", "Y1901b_en",
                                ],
                                "Annual governance basics (staffing, leadership, committees)",
                            ),
                        ),
                    ],
                ),
                category(
                    "dividend_distribution",
                    vec![entry(
                        "cash_dividends",
                        TableSpec::new(
                            "CD_Dividend",
                            &[
                                "Stkcd", "Finyear", "Ppdadt", "Ppcont_en", "Ddadt",
                                "Annocont_en", "Perspt", "Pertran", "Numdiv", "Regdt",
                                "Exdistdt", "Divdt", "DistributionBaseShares",
                            ],
                            "Cash and stock dividend distribution records",
                        ),
                    )],
                ),
                category(
                    "stock_trading",
                    vec![entry(
                        "annual_trading_summary",
                        TableSpec::new(
                            "TRD_Year",
                            &[
                                "Stkcd", "Trdynt", "Yopnprc", "Yclsprc", "Ynshrtrd",
                                "Ynvaltrd", "Ysmvosd", "Ysmvttl", "Ndaytrd", "Yretwd", "Yretnd",
                            ],
                            "Annual stock trading summary and returns",
                        ),
                    )],
                ),
            ],
        }
    }

    /// Stock classification tables (exchange, ST status, industry, area).
    /// The table names are placeholders to verify against the subscription.
    pub fn classifications() -> Self {
        Catalog {
            name: "classifications".to_string(),
            categories: vec![category(
                "classifications",
                vec![
                    entry(
                        "market_classification",
                        TableSpec::new(
                            "STK_MKT_Type",
                            &["Stkcd", "MarketType", "ListedDate", "BoardType"],
                            "Stock Market Classification (Exchange Type)",
                        ),
                    ),
                    entry(
                        "st_classification",
                        TableSpec::new(
                            "STK_ST_Status",
                            &["Stkcd", "Date", "IsST", "STType"],
                            "ST & Non-ST Stock Status",
                        ),
                    ),
                    entry(
                        "csrc_industry_2012",
                        TableSpec::new(
                            "STK_Industry_CSRC2012",
                            &[
                                "Stkcd", "Date", "IndustryCode", "IndustryName",
                                "IndustryCode_Level1", "IndustryName_Level1",
                            ],
                            "CSRC Industry Classification 2012",
                        ),
                    ),
                    entry(
                        "area_classification",
                        TableSpec::new(
                            "STK_Area_Classification",
                            &["Stkcd", "ProvinceCode", "ProvinceName", "CityCode", "CityName"],
                            "Area Classification (Province/City)",
                        ),
                    ),
                    entry(
                        "sws_industry_2021",
                        TableSpec::new(
                            "STK_Industry_SWS2021",
                            &[
                                "Stkcd", "Date", "SWSIndustryCode", "SWSIndustryName",
                                "Level1Code", "Level1Name",
                            ],
                            "SWS Industry Classification 2021",
                        ),
                    ),
                    entry(
                        "csrc_industry_2001",
                        TableSpec::new(
                            "STK_Industry_CSRC2001",
                            &["Stkcd", "Date", "IndustryCode", "IndustryName"],
                            "CSRC Industry Classification 2001",
                        ),
                    ),
                ],
            )],
        }
    }
}

fn category(name: &str, tables: Vec<CatalogTable>) -> Category {
    Category {
        name: name.to_string(),
        tables,
    }
}

fn entry(key: &str, spec: TableSpec) -> CatalogTable {
    CatalogTable {
        key: key.to_string(),
        spec,
    }
}

/// Column used to filter a table by stock code
pub fn determine_stock_field(spec: &TableSpec) -> String {
    if let Some(field) = spec.stock_field.as_deref().filter(|f| !f.is_empty()) {
        return field.to_string();
    }

    STOCK_FIELD_CANDIDATES
        .iter()
        .find_map(|candidate| {
            spec.columns
                .iter()
                .find(|column| column.to_lowercase() == *candidate)
        })
        .cloned()
        // Most CSMAR tables expose either Stkcd or Symbol
        .unwrap_or_else(|| "Stkcd".to_string())
}

/// `(<field> like '0%' or <field> like '3%' or <field> like '6%')`
pub fn build_stock_condition(stock_field: &str) -> String {
    let field = if stock_field.is_empty() { "Stkcd" } else { stock_field };
    let clauses: Vec<String> = A_SHARE_PREFIXES
        .iter()
        .map(|prefix| format!("{} like '{}%'", field, prefix))
        .collect();
    format!("({})", clauses.join(" or "))
}

/// Condition applied to every request of a table's download
pub fn selection_condition(spec: &TableSpec) -> String {
    match spec.condition.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(condition) => condition.to_string(),
        None => build_stock_condition(&determine_stock_field(spec)),
    }
}
