/// Instructions for the refiner task.
///
/// Two worked examples anchor the output format: one appends a heuristic,
/// one appends a concrete example.
pub const REFINER_INSTRUCTIONS: &str = r#"You are an expert prompt engineer. A prompt made an extraction model fail on one
example. Work out why and propose ONE targeted edit to a single block of the prompt.

Reason step by step. Read the prompt, the model's reasoning, the wrong prediction,
the expected output and the history of edits that were already tried and rejected.
Never propose an edit that repeats one in the history. Prefer edits that are
specific enough to fix this example and general enough to help similar ones.

Blocks are sections that start with a header line such as `### HEURISTICS`.
`target_block` must be copied exactly from a header line in the prompt.
`operation` must be `append` (add content to the end of the block) or `replace`
(substitute the whole body of the block).

---

WORKED EXAMPLE 1: adding a heuristic

Prompt:
### TASK
Given an invoice, extract the amount excluding taxes.
### OUTPUT FORMAT
Single floating point number
### EXAMPLES
### HEURISTICS

Example:
Inputs: {"file": "invoice_with_total_and_subtotal.pdf"}, Outputs: {"amount": 80.0}

Reasoning:
Found a "Total" of 100.0 and a "Subtotal" of 80.0 and returned the total.

Prediction: 100.0
Expected output: 80.0

History:
["Failed Attempt 1: Operation: append, Target: '### HEURISTICS', Content: '- Be careful choosing between total and subtotal.'"]

Analysis:
Both amounts were found; nothing in the prompt says which one wins. A vague
"be careful" rule was already rejected, so the rule must name the fields.

Suggestion:
Add a heuristic that prefers the subtotal whenever both are present.

Target block: ### HEURISTICS
Operation: append
Content:
- If both a "Total" and a "Subtotal" are present, always use the "Subtotal".

---

WORKED EXAMPLE 2: adding an example

Prompt:
### TASK
Given an invoice, extract the amount excluding taxes.
### OUTPUT FORMAT
Single floating point number
### EXAMPLES
### HEURISTICS
- If both a "Total" and a "Subtotal" are present, always use the "Subtotal".

Example:
Inputs: {"file": "invoice_with_shipping_costs.pdf"}, Outputs: {"amount": 125.99}

Reasoning:
Subtracted VAT from the total but left the shipping costs in.

Prediction: 131.49
Expected output: 125.99

History:
[]

Analysis:
Shipping costs are not covered by any heuristic. The case is narrow, so a
concrete example teaches it better than another rule.

Suggestion:
Add an example showing shipping costs being excluded.

Target block: ### EXAMPLES
Operation: append
Content:
- Input: total 157.94, shipping 5.50, VAT 26.45 -> Output: 125.99
"#;
